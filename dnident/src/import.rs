//! Import result files into an identification. Files are parsed in parallel, the results are
//! merged into the store in the order the files were given.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use context_error::*;
use rayon::prelude::*;
use tracing::{info, warn};

use dncore::{
    advocate::Advocate,
    error::{DeNovoError, DeNovoErrorKind, canceled, deduplicate_warnings, file_context},
    spectrum::SpectrumProvider,
};

use crate::{
    formats::{ReadOutcome, ReaderRegistry},
    session::SessionContext,
    store::IdentificationStore,
    task::Progress,
};

/// The summary of an import
#[derive(Clone, Debug, Default)]
pub struct ImportOutcome {
    /// The number of files that were read
    pub files_read: usize,
    /// The number of spectra with at least one assumption per advocate
    pub spectra: BTreeMap<Advocate, usize>,
    /// The number of assumptions per advocate
    pub assumptions: BTreeMap<Advocate, usize>,
    /// All problems encountered, each distinct problem once
    pub warnings: Vec<DeNovoError>,
}

impl ImportOutcome {
    /// The total number of assumptions imported
    pub fn total_assumptions(&self) -> usize {
        self.assumptions.values().sum()
    }
}

/// Reads result files with a set of readers
#[derive(Debug, Default)]
pub struct Importer {
    registry: ReaderRegistry,
}

impl Importer {
    /// Use the given readers
    pub const fn new(registry: ReaderRegistry) -> Self {
        Self { registry }
    }

    /// The readers in use
    pub const fn registry(&self) -> &ReaderRegistry {
        &self.registry
    }

    /// Read all files and add their assumptions to the store. A file that cannot be opened, is
    /// not recognised, or does not have the expected layout is skipped with a warning.
    /// # Errors
    /// A `Canceled` error if the import was canceled, files merged before that point stay in the
    /// store. Any error of the store itself.
    pub fn import(
        &self,
        files: &[PathBuf],
        spectra: Option<&dyn SpectrumProvider>,
        session: &SessionContext,
        store: &mut IdentificationStore,
        progress: &Progress,
    ) -> Result<ImportOutcome, DeNovoError> {
        let context = session.reader_context(spectra);
        progress.start(files.len(), "Reading result files");
        let parsed = files
            .par_iter()
            .map(|path| {
                if progress.is_canceled() {
                    return None;
                }
                let result = self.registry.read_file(path, &context);
                progress.increment();
                Some(result)
            })
            .collect::<Vec<_>>();
        progress.check("Import")?;

        let mut outcome = ImportOutcome::default();
        progress.start(files.len(), "Merging results");
        for (path, result) in files.iter().zip(parsed) {
            progress.check("Import")?;
            match result {
                Some(Ok(Some((advocate, read)))) => {
                    outcome.files_read += 1;
                    merge(store, path, advocate, read, &mut outcome)?;
                }
                Some(Ok(None)) => {
                    let error = DeNovoError::new(
                        DeNovoErrorKind::ToolVersion,
                        "Unrecognised result file",
                        "The file does not look like the output of any of the supported tools",
                        file_context(path),
                    );
                    warn!("{error}");
                    outcome.warnings.push(error);
                }
                Some(Err(error)) if error.get_kind().is_fatal() => return Err(error),
                Some(Err(error)) => {
                    warn!("{error}");
                    outcome.warnings.push(error);
                }
                None => return Err(canceled("Import")),
            }
            progress.increment();
        }
        outcome.warnings = deduplicate_warnings(outcome.warnings);

        for (advocate, count) in &outcome.assumptions {
            info!(
                "Imported {count} {advocate} assumptions for {} spectra",
                outcome.spectra.get(advocate).copied().unwrap_or_default()
            );
        }
        info!(
            "Read {} of {} files with {} warnings, the identification holds {} spectra",
            outcome.files_read,
            files.len(),
            outcome.warnings.len(),
            store.spectrum_count()
        );
        Ok(outcome)
    }
}

fn merge(
    store: &mut IdentificationStore,
    path: &Path,
    advocate: Advocate,
    read: ReadOutcome,
    outcome: &mut ImportOutcome,
) -> Result<(), DeNovoError> {
    *outcome.spectra.entry(advocate).or_default() += read.spectra.len();
    *outcome.assumptions.entry(advocate).or_default() +=
        read.spectra.iter().map(|s| s.len()).sum::<usize>();
    info!(
        "{}: {} spectra from {advocate}",
        path.display(),
        read.spectra.len()
    );
    outcome.warnings.extend(read.warnings);
    store.add_spectrum_matches(read.spectra)
}

/// Import the files with all built in readers, see [`Importer::import`]
/// # Errors
/// See [`Importer::import`].
pub fn import_results(
    files: &[PathBuf],
    spectra: Option<&dyn SpectrumProvider>,
    session: &SessionContext,
    store: &mut IdentificationStore,
    progress: &Progress,
) -> Result<ImportOutcome, DeNovoError> {
    Importer::default().import(files, spectra, session, store, progress)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::CacheSettings;

    fn directory(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("dnident_import_{name}_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&path);
        std::fs::create_dir_all(&path).unwrap();
        path
    }

    #[test]
    fn problems_become_warnings() {
        let dir = directory("warnings");
        let unknown = dir.join("notes.txt");
        std::fs::write(&unknown, "Nothing to see here\n").unwrap();
        let tags = dir.join("run.tags");
        std::fs::write(
            &tags,
            "H\tDirecTag 1.4.0\n\
             H\tTagsHeader\tTag\tType\tTotal\n",
        )
        .unwrap();
        let missing = dir.join("missing.tags");
        let mut store = IdentificationStore::open(dir.join("cache"), CacheSettings::default()).unwrap();
        let outcome = import_results(
            &[unknown, missing, tags],
            None,
            &SessionContext::defaults(),
            &mut store,
            &Progress::new(),
        )
        .unwrap();
        assert_eq!(outcome.files_read, 1);
        assert_eq!(outcome.warnings.len(), 2);
        assert_eq!(outcome.warnings[0].get_kind(), DeNovoErrorKind::ToolVersion);
        assert_eq!(outcome.warnings[1].get_kind(), DeNovoErrorKind::Io);
        assert_eq!(store.spectrum_count(), 0);
    }

    #[test]
    fn canceled_import_adds_nothing() {
        let dir = directory("cancel");
        let mut store = IdentificationStore::open(dir.join("cache"), CacheSettings::default()).unwrap();
        let progress = Progress::new();
        progress.cancel();
        let error = import_results(
            &[dir.join("run.tags")],
            None,
            &SessionContext::defaults(),
            &mut store,
            &progress,
        )
        .unwrap_err();
        assert_eq!(error.get_kind(), DeNovoErrorKind::Canceled);
        assert_eq!(store.spectrum_count(), 0);
    }
}

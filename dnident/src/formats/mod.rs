//! Readers for the native result files of all supported sequencing tools.

mod directag;
mod novor;
mod pepnovo;
mod pnovo;

use std::{collections::BTreeSet, path::Path, sync::Arc};

use context_error::*;
use tracing::warn;

use dncore::{
    advocate::Advocate,
    error::{DeNovoError, DeNovoErrorKind, file_context},
    modification::ModificationCatalog,
    parameters::SearchParameters,
    sequence::Tag,
    spectrum::SpectrumProvider,
};

use crate::{
    common_parser::{Line, read_lines},
    helper_functions::{open_result_file, plain_file_name},
    modification_mapping::ModificationMapping,
    spectrum_match::SpectrumMatch,
};

pub use directag::DirecTagReader;
pub use novor::NovorReader;
pub use pepnovo::PepNovoReader;
pub use pnovo::PNovoReader;

/// Everything a reader needs besides the file itself
#[derive(Clone, Copy)]
pub struct ReaderContext<'a> {
    /// The canonical modifications
    pub catalog: &'a ModificationCatalog,
    /// The tool specific modification tokens
    pub mapping: &'a ModificationMapping,
    /// The parameters of the search that produced the files
    pub parameters: &'a SearchParameters,
    /// The spectra the results refer to, used to resolve scan numbers to titles
    pub spectra: Option<&'a dyn SpectrumProvider>,
}

impl std::fmt::Debug for ReaderContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderContext")
            .field("catalog", &self.catalog.len())
            .field("parameters", &self.parameters)
            .field("spectra", &self.spectra.is_some())
            .finish_non_exhaustive()
    }
}

impl ReaderContext<'_> {
    /// Place all fixed modifications from the search parameters on the tag
    pub fn attach_fixed_modifications(&self, tag: &mut Tag) {
        for name in &self.parameters.fixed_modifications {
            tag.add_fixed_modification(name, self.catalog);
        }
    }
}

/// The results of reading a single file
#[derive(Clone, Debug, Default)]
pub struct ReadOutcome {
    /// The spectra in file order
    pub spectra: Vec<SpectrumMatch>,
    /// All problems encountered that did not stop the file from being read
    pub warnings: Vec<DeNovoError>,
}

/// A reader for one native result file format
pub trait ResultFileReader: Send + Sync {
    /// The tool writing this format
    fn advocate(&self) -> Advocate;

    /// Check if this reader can read this file, based on the lowercase file name (without `.gz`)
    /// and the first non empty line
    fn recognises(&self, file_name: &str, first_line: &str) -> bool;

    /// Read all lines of a file
    /// # Errors
    /// A `ToolVersion` error if the layout of the file is not what this reader expects, any
    /// malformed record is skipped and reported as a warning instead.
    fn read(
        &self,
        lines: &[Line],
        source: &str,
        context: &ReaderContext<'_>,
    ) -> Result<ReadOutcome, DeNovoError>;
}

/// The known readers, tried in order
pub struct ReaderRegistry {
    readers: Vec<Box<dyn ResultFileReader>>,
}

impl std::fmt::Debug for ReaderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.readers.iter().map(|r| r.advocate()))
            .finish()
    }
}

impl Default for ReaderRegistry {
    fn default() -> Self {
        Self {
            readers: vec![
                Box::new(PepNovoReader),
                Box::new(DirecTagReader),
                Box::new(PNovoReader),
                Box::new(NovorReader),
            ],
        }
    }
}

impl ReaderRegistry {
    /// A registry without any readers
    pub fn empty() -> Self {
        Self {
            readers: Vec::new(),
        }
    }

    /// Add a reader, it is tried after all readers already registered
    pub fn register(&mut self, reader: Box<dyn ResultFileReader>) {
        self.readers.push(reader);
    }

    /// Find the reader for this file
    pub fn find(&self, file_name: &str, first_line: &str) -> Option<&dyn ResultFileReader> {
        self.readers
            .iter()
            .find(|r| r.recognises(file_name, first_line))
            .map(AsRef::as_ref)
    }

    /// Open and read a file with the reader that recognises it. Returns `Ok(None)` if no reader
    /// recognises the file.
    /// # Errors
    /// If the file could not be opened or read, or if its layout is not the expected one.
    pub fn read_file(
        &self,
        path: &Path,
        context: &ReaderContext<'_>,
    ) -> Result<Option<(Advocate, ReadOutcome)>, DeNovoError> {
        let source = Arc::new(path.to_string_lossy().to_string());
        let lines = read_lines(open_result_file(path)?, &source)?;
        let file_name = plain_file_name(path);
        let first_line = lines
            .iter()
            .map(|l| l.text.trim())
            .find(|l| !l.is_empty())
            .unwrap_or_default();
        let Some(reader) = self.find(&file_name, first_line) else {
            return Ok(None);
        };
        let display_name = path
            .file_name()
            .map_or_else(|| source.to_string(), |n| n.to_string_lossy().to_string());
        reader
            .read(&lines, &display_name, context)
            .map(|outcome| Some((reader.advocate(), outcome)))
    }
}

/// Gather the records that could not be read in a file, so that only a single warning is emitted
/// per file
#[derive(Debug, Default)]
pub(crate) struct RecordErrors {
    first: Option<DeNovoError>,
    count: usize,
    unmapped: BTreeSet<String>,
    warnings: Vec<DeNovoError>,
}

impl RecordErrors {
    /// Log and count a skipped record
    pub(crate) fn skip(&mut self, error: DeNovoError) {
        warn!("{error}");
        self.count += 1;
        if self.first.is_none() {
            self.first = Some(error);
        }
    }

    /// Register an unmapped modification, only the first occurrence of every token is kept
    pub(crate) fn unmapped(&mut self, error: DeNovoError) {
        if self.unmapped.insert(error.get_short_description().to_string()) {
            warn!("{error}");
            self.warnings.push(error);
        }
    }

    /// Turn everything into the list of warnings for this file
    pub(crate) fn finish(mut self, source: &str) -> Vec<DeNovoError> {
        if let Some(first) = self.first {
            let count = self.count;
            let mut contexts = first.get_contexts().iter().cloned().collect::<Vec<_>>();
            if contexts.is_empty() {
                contexts.push(file_context(source));
            }
            self.warnings.push(DeNovoError::small(
                DeNovoErrorKind::Parse,
                format!("Skipped {count} malformed record{}", if count == 1 { "" } else { "s" }),
                format!(
                    "{count} record{} could not be read and {} skipped, the first problem was: {}\n{}",
                    if count == 1 { "" } else { "s" },
                    if count == 1 { "was" } else { "were" },
                    first.get_short_description(),
                    first.get_long_description()
                ),
            )
            .add_contexts(contexts));
        }
        self.warnings
    }
}

/// The name of the spectrum file a result file refers to. The tools name their output after the
/// spectrum file, either keeping its extension (`run.mgf.out`) or replacing it (`run.tags`).
pub(crate) fn spectrum_file(source: &str, result_extension: &str) -> String {
    let name = source.strip_suffix(".gz").unwrap_or(source);
    let name = name.strip_suffix(result_extension).unwrap_or(name);
    if name.to_ascii_lowercase().ends_with(".mgf") {
        name.to_string()
    } else {
        format!("{name}.mgf")
    }
}

/// The error for a file that does not follow the expected layout
pub(crate) fn tool_version_error(
    advocate: Advocate,
    source: &str,
    line: Option<&Line>,
    explanation: impl Into<String>,
) -> DeNovoError {
    DeNovoError::new(
        DeNovoErrorKind::ToolVersion,
        format!("Unsupported {advocate} file"),
        explanation.into(),
        line.map_or_else(|| file_context(source), Line::context),
    )
}

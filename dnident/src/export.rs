//! Write the assumptions of an identification as plain text.
//!
//! Tag and peptide exports write one tab separated line per passing assumption: spectrum title,
//! algorithm, sequence, score, and charge, followed by the parent proteins for peptides. The
//! BLAST export writes a FASTA like query per passing assumption containing only the longest
//! contiguous run of residues.

use std::{
    fmt::Display,
    fs::File,
    io::{BufWriter, Write},
    path::Path,
    str::FromStr,
};

use context_error::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use dncore::{
    advocate::Advocate,
    error::{DeNovoError, DeNovoErrorKind, file_context, io_error},
    spectrum::SpectrumIdentifier,
};

use crate::{
    assumption::ResultAssumption, ranking::top_scores, store::IdentificationStore,
    task::Progress,
};

/// The kinds of export
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum ExportType {
    /// Only tag assumptions
    Tags,
    /// Only peptide assumptions
    Peptides,
    /// All assumptions as BLAST queries
    Blast,
}

impl Display for ExportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Tags => "tags",
                Self::Peptides => "peptides",
                Self::Blast => "blast",
            }
        )
    }
}

impl FromStr for ExportType {
    type Err = DeNovoError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tags" | "tag" => Ok(Self::Tags),
            "peptides" | "peptide" => Ok(Self::Peptides),
            "blast" => Ok(Self::Blast),
            _ => Err(DeNovoError::small(
                DeNovoErrorKind::Configuration,
                "Unknown export type",
                format!("'{s}' is not an export type, use one of: tags, peptides, blast"),
            )),
        }
    }
}

/// Which assumptions are exported
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct ExportSettings {
    /// The score threshold an assumption has to pass
    pub threshold: f64,
    /// If the score has to be at least the threshold (instead of at most)
    pub greater_than: bool,
    /// The number of best scores per advocate per spectrum that are exported
    pub max_matches: usize,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            threshold: 0.0,
            greater_than: true,
            max_matches: 10,
        }
    }
}

/// Export the assumptions of the given spectra, in the given order. Within a spectrum advocates
/// follow [`Advocate::PRIORITY`] and scores go from best to worst. Returns the number of
/// assumptions written.
/// # Errors
/// A `Busy` error if another heavy operation is running on this identification, an `Io` error if
/// writing failed, a `Canceled` error if the export was canceled.
pub fn export(
    writer: impl Write,
    export_type: ExportType,
    store: &mut IdentificationStore,
    spectrum_order: &[SpectrumIdentifier],
    settings: &ExportSettings,
    progress: &Progress,
) -> Result<usize, DeNovoError> {
    let guard = store.operation_lock().begin(format!("{export_type} export"))?;
    guard.finish_result(write_all(
        writer,
        export_type,
        store,
        spectrum_order,
        settings,
        progress,
    ))
}

/// Export to a file, see [`export`]
/// # Errors
/// See [`export`], in addition an `Io` error if the file could not be created.
pub fn export_to_file(
    path: impl AsRef<Path>,
    export_type: ExportType,
    store: &mut IdentificationStore,
    spectrum_order: &[SpectrumIdentifier],
    settings: &ExportSettings,
    progress: &Progress,
) -> Result<usize, DeNovoError> {
    let path = path.as_ref();
    let file =
        File::create(path).map_err(|e| io_error(path, "Could not create export file", &e))?;
    let written = export(
        BufWriter::new(file),
        export_type,
        store,
        spectrum_order,
        settings,
        progress,
    )
    .map_err(|e| {
        if e.get_kind() == DeNovoErrorKind::Io && e.get_contexts().is_empty() {
            e.add_contexts([file_context(path)])
        } else {
            e
        }
    })?;
    info!("Exported {written} assumptions to {}", path.display());
    Ok(written)
}

fn write_all(
    mut writer: impl Write,
    export_type: ExportType,
    store: &mut IdentificationStore,
    spectrum_order: &[SpectrumIdentifier],
    settings: &ExportSettings,
    progress: &Progress,
) -> Result<usize, DeNovoError> {
    let write_error = |e: std::io::Error| {
        DeNovoError::small(DeNovoErrorKind::Io, "Could not write export", e.to_string())
    };
    let mut written = 0;
    progress.start(spectrum_order.len(), format!("Exporting {export_type}"));
    for identifier in spectrum_order {
        progress.check("Export")?;
        if let Some(assumptions) = store.assumptions(identifier)? {
            for advocate in Advocate::PRIORITY {
                let Some(scores) = assumptions.get(&advocate.index()) else {
                    continue;
                };
                for score in top_scores(
                    advocate,
                    scores.keys().copied(),
                    settings.threshold,
                    settings.greater_than,
                    settings.max_matches,
                ) {
                    for assumption in scores.get(&score).into_iter().flatten() {
                        if write_assumption(&mut writer, export_type, identifier, assumption)
                            .map_err(write_error)?
                        {
                            written += 1;
                        }
                    }
                }
            }
        }
        progress.increment();
    }
    writer.flush().map_err(write_error)?;
    Ok(written)
}

/// Write a single assumption if it belongs in this export, returns if it was written
fn write_assumption(
    writer: &mut impl Write,
    export_type: ExportType,
    identifier: &SpectrumIdentifier,
    assumption: &ResultAssumption,
) -> std::io::Result<bool> {
    let title = identifier.title();
    let data = assumption.data();
    match (export_type, assumption) {
        (ExportType::Tags, ResultAssumption::Tag { tag, .. }) => {
            writeln!(
                writer,
                "{title}\t{}\t{}\t{}\t{}",
                data.advocate,
                tag.variable_modified_sequence(),
                data.score,
                data.identification_charge
            )?;
        }
        (ExportType::Peptides, ResultAssumption::Peptide { peptide, .. }) => {
            writeln!(
                writer,
                "{title}\t{}\t{}\t{}\t{}\t{}",
                data.advocate,
                peptide.variable_modified_sequence(),
                data.score,
                data.identification_charge,
                peptide.parent_proteins().join(", ")
            )?;
        }
        (ExportType::Blast, assumption) => {
            let run = assumption.longest_amino_acid_run();
            if run.is_empty() {
                return Ok(false);
            }
            writeln!(writer, ">{title}|{}|{}", data.advocate, data.rank)?;
            writeln!(writer, "{run}")?;
        }
        (ExportType::Tags | ExportType::Peptides, _) => return Ok(false),
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assumption::AssumptionData, spectrum_match::SpectrumMatch, store::CacheSettings,
        task::OperationState,
    };
    use dncore::{
        aminoacid::parse_sequence,
        sequence::{ModificationMatch, Peptide, Tag},
        system::da,
    };

    fn store(name: &str) -> IdentificationStore {
        let path =
            std::env::temp_dir().join(format!("dnident_export_{name}_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&path);
        let mut store = IdentificationStore::open(path, CacheSettings::default()).unwrap();
        let mut peptide = Peptide::new(parse_sequence("PEPTIDEK").unwrap(), Vec::new());
        peptide.add_parent_proteins(["P2".to_string(), "P1".to_string()]);
        store
            .add_spectrum_matches([
                SpectrumMatch::with_assumptions(
                    SpectrumIdentifier::new("run.mgf", "spectrum 1"),
                    [
                        ResultAssumption::tag(
                            Tag::from_gapped_sequence(
                                da(0.0),
                                &parse_sequence("PEPT").unwrap(),
                                Vec::new(),
                                da(147.07),
                            ),
                            AssumptionData::new(Advocate::PepNovo, 4.5, 1, 2, "run.mgf.out"),
                        ),
                        ResultAssumption::peptide(
                            peptide,
                            AssumptionData::new(Advocate::Novor, 80.0, 1, 3, "run.novor.csv"),
                        ),
                    ],
                ),
            ])
            .unwrap();
        store
    }

    fn exported(store: &mut IdentificationStore, export_type: ExportType) -> String {
        let order = store.spectrum_identifiers().to_vec();
        let mut output = Vec::new();
        export(
            &mut output,
            export_type,
            store,
            &order,
            &ExportSettings::default(),
            &Progress::new(),
        )
        .unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn tags_and_peptides() {
        let mut store = store("kinds");
        assert_eq!(
            exported(&mut store, ExportType::Tags),
            "spectrum 1\tPepNovo+\tPEPT<147.070>\t4.5\t2\n"
        );
        assert_eq!(
            exported(&mut store, ExportType::Peptides),
            "spectrum 1\tNovor\tPEPTIDEK\t80\t3\tP1, P2\n"
        );
        assert_eq!(
            exported(&mut store, ExportType::Blast),
            ">spectrum 1|PepNovo+|1\nPEPT\n>spectrum 1|Novor|1\nPEPTIDEK\n"
        );
        assert_eq!(store.operation_lock().state(), OperationState::Completed);
    }

    #[test]
    fn fixed_modifications_left_out() {
        let tag = Tag::from_gapped_sequence(
            da(0.0),
            &parse_sequence("CPM").unwrap(),
            vec![
                ModificationMatch::fixed(1, "Carbamidomethylation of C"),
                ModificationMatch::variable(3, "Oxidation of M"),
            ],
            da(0.0),
        );
        let assumption = ResultAssumption::tag(
            tag,
            AssumptionData::new(Advocate::DirecTag, 0.01, 1, 2, "run.tags"),
        );
        let mut output = Vec::new();
        let written = write_assumption(
            &mut output,
            ExportType::Tags,
            &SpectrumIdentifier::new("run.mgf", "index=0"),
            &assumption,
        )
        .unwrap();
        assert!(written);
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "index=0\tDirecTag\tCPM[Oxidation of M]\t0.01\t2\n"
        );
    }

    #[test]
    fn busy_and_canceled() {
        let mut store = store("busy");
        let order = store.spectrum_identifiers().to_vec();
        let guard = store.operation_lock().begin("protein mapping").unwrap();
        let error = export(
            Vec::new(),
            ExportType::Tags,
            &mut store,
            &order,
            &ExportSettings::default(),
            &Progress::new(),
        )
        .unwrap_err();
        assert_eq!(error.get_kind(), DeNovoErrorKind::Busy);
        drop(guard);

        let progress = Progress::new();
        progress.cancel();
        let error = export(
            Vec::new(),
            ExportType::Tags,
            &mut store,
            &order,
            &ExportSettings::default(),
            &progress,
        )
        .unwrap_err();
        assert_eq!(error.get_kind(), DeNovoErrorKind::Canceled);
        assert_eq!(store.operation_lock().state(), OperationState::Canceled);
    }

    #[test]
    fn export_type_names() {
        assert_eq!("Blast".parse::<ExportType>().unwrap(), ExportType::Blast);
        assert!("csv".parse::<ExportType>().is_err());
    }
}

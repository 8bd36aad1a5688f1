#![allow(clippy::missing_panics_doc, clippy::float_cmp)]
//! Integration tests for the full import, rank, map, and export pipeline
use std::{
    path::PathBuf,
    sync::{Mutex, mpsc::Receiver},
};

use context_error::*;
use dncore::{
    advocate::Advocate,
    aminoacid::{AminoAcid, parse_sequence},
    error::{DeNovoError, DeNovoErrorKind},
    sequence::{ModificationMatch, Peptide, Tag},
    spectrum::SpectrumIdentifier,
    system::{Mass, da},
    tolerance::Tolerance,
};
use dnident::{mapping::PeptideProteinMapping, prelude::*};

const PROTEINS: &str = ">P1 Test protein\nMKGPEPTIDEKAAPEPMK\n>P2\nLLGVTKR\n";

fn store(name: &str) -> IdentificationStore {
    let path =
        std::env::temp_dir().join(format!("dnident_pipeline_{name}_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&path);
    IdentificationStore::open(path, CacheSettings::default()).unwrap()
}

fn import(store: &mut IdentificationStore, files: &[&str]) -> ImportOutcome {
    let files = files
        .iter()
        .map(|f| PathBuf::from("tests/data").join(f))
        .collect::<Vec<_>>();
    import_results(
        &files,
        None,
        &SessionContext::defaults(),
        store,
        &Progress::new(),
    )
    .unwrap()
}

fn fasta_mapper() -> FastaProteinMapper {
    FastaProteinMapper::new(
        FastaProtein::parse_reader(PROTEINS.as_bytes(), "proteins.fasta").unwrap(),
        dncore::modification::ModificationCatalog::common(),
        vec!["Carbamidomethylation of C".to_string()],
    )
}

/// Import a DirecTag file with two tags and export the tags passing an e-value of 0.1
#[test]
fn directag_round_trip() {
    let mut store = store("round_trip");
    let outcome = import(&mut store, &["round_trip.tags"]);
    assert_eq!(outcome.files_read, 1);
    assert_eq!(outcome.assumptions[&Advocate::DirecTag], 2);
    assert!(outcome.warnings.is_empty());

    let identifier = SpectrumIdentifier::new("round_trip.mgf", "index=0");
    let scores = store.assumptions(&identifier).unwrap().unwrap()[&Advocate::DirecTag.index()]
        .keys()
        .map(|s| s.0)
        .collect::<Vec<_>>();
    assert_eq!(best_score(Advocate::DirecTag, scores), 0.01);
    let range = store.statistics().scores(Advocate::DirecTag);
    assert_eq!((range.min(), range.max()), (Some(0.01), Some(0.5)));

    let mut output = Vec::new();
    let order = store.spectrum_identifiers().to_vec();
    let written = export(
        &mut output,
        ExportType::Tags,
        &mut store,
        &order,
        &ExportSettings {
            threshold: 0.1,
            greater_than: false,
            max_matches: 10,
        },
        &Progress::new(),
    )
    .unwrap();
    assert_eq!(written, 1);
    let output = String::from_utf8(output).unwrap();
    let lines = output.lines().collect::<Vec<_>>();
    assert_eq!(lines, ["index=0\tDirecTag\tABC\t0.01\t2"]);
    store.close().unwrap();
}

/// Importing the same files into two fresh identifications gives the same assumptions
#[test]
fn import_is_idempotent() {
    let files = ["run.mgf.out", "run.novor.csv"];
    let mut first = store("idempotent_a");
    let mut second = store("idempotent_b");
    let first_outcome = import(&mut first, &files);
    let second_outcome = import(&mut second, &files);
    assert_eq!(first_outcome.files_read, second_outcome.files_read);
    assert_eq!(first_outcome.spectra, second_outcome.spectra);
    assert_eq!(first_outcome.assumptions, second_outcome.assumptions);
    assert_eq!(
        first_outcome.warnings[0].to_string(),
        second_outcome.warnings[0].to_string()
    );
    assert_eq!(first_outcome.warnings.len(), 1);
    assert_eq!(
        first_outcome.warnings[0].get_kind(),
        DeNovoErrorKind::UnmappedModification
    );
    assert_eq!(first.snapshot().unwrap(), second.snapshot().unwrap());

    let identifier = SpectrumIdentifier::new("run.mgf", "1");
    let novor = first.assumptions(&identifier).unwrap().unwrap()[&Advocate::Novor.index()]
        .values()
        .flatten()
        .next()
        .unwrap()
        .clone();
    assert_eq!(novor.sequence_string(), "PEPM[Oxidation of M]K");
    assert_eq!(novor.amino_acid_scores().map(<[_]>::len), Some(5));
}

/// Ranking a fixed snapshot twice gives the same order, spectra are grouped by advocate priority
#[test]
fn ordering_is_deterministic() {
    let mut store = store("ordering");
    import(&mut store, &["run.novor.csv", "run.mgf.out"]);
    let snapshot = store.snapshot().unwrap();
    let mut titles = store
        .spectrum_identifiers_in("run.mgf")
        .map(|id| id.title().to_string())
        .collect::<Vec<_>>();
    titles.push("not identified".to_string());
    let ordered = order_titles_by_score(&snapshot, "run.mgf", &titles);
    assert_eq!(
        ordered,
        ["spectrum one", "spectrum three", "1", "3", "not identified"]
    );
    assert_eq!(order_titles_by_score(&snapshot, "run.mgf", &titles), ordered);
}

/// A tag shorter than the shortest indexable length is never looked up
#[test]
fn short_tags_are_not_mapped() {
    let mut store = store("short_tags");
    store
        .add_spectrum_matches([SpectrumMatch::with_assumptions(
            SpectrumIdentifier::new("run.mgf", "short"),
            [ResultAssumption::tag(
                Tag::from_gapped_sequence(
                    AminoAcid::Glycine.monoisotopic_mass(),
                    &parse_sequence("PEP").unwrap(),
                    Vec::new(),
                    da(300.0),
                ),
                AssumptionData::new(Advocate::PepNovo, 4.0, 1, 2, "run.mgf.out"),
            )],
        )])
        .unwrap();
    let order = store.spectrum_identifiers().to_vec();
    let outcome = map_to_proteins(
        &mut store,
        &order,
        &fasta_mapper().with_min_indexable_length(5),
        &MappingSettings::default(),
        &Progress::new(),
    )
    .unwrap();
    assert!(!outcome.any_match_found);
    assert!(outcome.completed);
    assert_eq!(outcome.derived_peptides, 0);
    assert_eq!(
        store.assumptions(&order[0]).unwrap().unwrap()[&Advocate::PepNovo.index()]
            .values()
            .flatten()
            .count(),
        1
    );
}

/// PepNovo+ tags are extended to full peptides, Novor peptides get their proteins
#[test]
fn mapping_against_fasta() {
    let mut store = store("fasta");
    import(&mut store, &["run.mgf.out", "run.novor.csv"]);
    let order = store.spectrum_identifiers().to_vec();
    let outcome = map_to_proteins(
        &mut store,
        &order,
        &fasta_mapper(),
        &MappingSettings {
            fragment_tolerance: Tolerance::new_absolute(0.02),
            ..MappingSettings::default()
        },
        &Progress::new(),
    )
    .unwrap();
    assert!(outcome.any_match_found);
    assert!(outcome.completed);

    let novor = store
        .assumptions(&SpectrumIdentifier::new("run.mgf", "3"))
        .unwrap()
        .unwrap()[&Advocate::Novor.index()]
        .values()
        .flatten()
        .next()
        .unwrap()
        .as_peptide()
        .unwrap()
        .clone();
    assert_eq!(novor.parent_proteins(), ["P1"]);

    // Tags stay next to any peptides derived from them
    let tags = store
        .assumptions(&SpectrumIdentifier::new("run.mgf", "spectrum three"))
        .unwrap()
        .unwrap()[&Advocate::PepNovo.index()]
        .values()
        .flatten()
        .filter_map(ResultAssumption::as_tag)
        .count();
    assert_eq!(tags, 2);
    store.close().unwrap();
}

/// A modification missing from the catalog is reported for its spectrum, the others still map
#[test]
fn unknown_modifications_do_not_stop_mapping() {
    let mut store = store("unknown_modification");
    store
        .add_spectrum_matches([
            SpectrumMatch::with_assumptions(
                SpectrumIdentifier::new("run.mgf", "sparkly"),
                [ResultAssumption::tag(
                    Tag::from_gapped_sequence(
                        AminoAcid::Glycine.monoisotopic_mass(),
                        &parse_sequence("PEPTIDE").unwrap(),
                        vec![ModificationMatch::variable(1, "Sparkles of P")],
                        da(146.105_527),
                    ),
                    AssumptionData::new(Advocate::PepNovo, 4.0, 1, 2, "run.mgf.out"),
                )],
            ),
            SpectrumMatch::with_assumptions(
                SpectrumIdentifier::new("run.mgf", "plain"),
                [ResultAssumption::peptide(
                    Peptide::new(parse_sequence("PEPTIDEK").unwrap(), Vec::new()),
                    AssumptionData::new(Advocate::Novor, 80.0, 1, 2, "run.novor.csv"),
                )],
            ),
        ])
        .unwrap();
    let order = store.spectrum_identifiers().to_vec();
    let outcome = map_to_proteins(
        &mut store,
        &order,
        &fasta_mapper(),
        &MappingSettings::default(),
        &Progress::new(),
    )
    .unwrap();
    assert!(outcome.completed);
    assert!(outcome.any_match_found);
    assert_eq!(outcome.spectra_processed, 2);
    assert_eq!(outcome.warnings.len(), 1);
    assert_eq!(
        outcome.warnings[0].get_kind(),
        DeNovoErrorKind::UnmappedModification
    );
    assert_eq!(outcome.warnings[0].get_contexts().len(), 2);
    assert_eq!(store.operation_lock().state(), OperationState::Completed);

    let plain = store
        .assumptions(&SpectrumIdentifier::new("run.mgf", "plain"))
        .unwrap()
        .unwrap()[&Advocate::Novor.index()]
        .values()
        .flatten()
        .next()
        .unwrap()
        .as_peptide()
        .unwrap()
        .clone();
    assert_eq!(plain.parent_proteins(), ["P1"]);
    store.close().unwrap();
}

/// Cancels the mapping as soon as the first spectrum is mapped
struct CancelingMapper {
    inner: FastaProteinMapper,
    progress: Progress,
}

impl PeptideMapper for CancelingMapper {
    fn min_indexable_length(&self) -> usize {
        self.inner.min_indexable_length()
    }

    fn map_tag(
        &self,
        tag: &Tag,
        tolerance: Tolerance<Mass>,
    ) -> Result<Vec<PeptideProteinMapping>, DeNovoError> {
        self.progress.cancel();
        self.inner.map_tag(tag, tolerance)
    }

    fn map_sequence(
        &self,
        sequence: &[AminoAcid],
    ) -> Result<Vec<PeptideProteinMapping>, DeNovoError> {
        self.progress.cancel();
        self.inner.map_sequence(sequence)
    }
}

/// Canceling keeps the spectra mapped so far and leaves the others untouched
#[test]
fn cancellation_is_safe() {
    let mut store = store("cancel");
    import(&mut store, &["run.novor.csv"]);
    let order = store.spectrum_identifiers().to_vec();
    let before = store.assumptions(&order[1]).unwrap().unwrap().clone();
    let progress = Progress::new();
    let outcome = map_to_proteins(
        &mut store,
        &order,
        &CancelingMapper {
            inner: fasta_mapper(),
            progress: progress.clone(),
        },
        &MappingSettings::default(),
        &progress,
    )
    .unwrap();
    assert!(!outcome.completed);
    assert!(outcome.any_match_found);
    assert_eq!(outcome.spectra_processed, 1);
    assert_eq!(
        store.operation_lock().state(),
        OperationState::Canceled
    );

    let mapped = store.assumptions(&order[0]).unwrap().unwrap()[&Advocate::Novor.index()]
        .values()
        .flatten()
        .next()
        .unwrap()
        .as_peptide()
        .unwrap()
        .clone();
    assert_eq!(mapped.parent_proteins(), ["P1"]);
    assert_eq!(store.assumptions(&order[1]).unwrap().unwrap(), &before);
}

/// Blocks every lookup until released
struct BlockingMapper {
    release: Mutex<Receiver<()>>,
}

impl PeptideMapper for BlockingMapper {
    fn min_indexable_length(&self) -> usize {
        4
    }

    fn map_tag(
        &self,
        _tag: &Tag,
        _tolerance: Tolerance<Mass>,
    ) -> Result<Vec<PeptideProteinMapping>, DeNovoError> {
        let _ = self.release.lock().unwrap().recv();
        Ok(Vec::new())
    }

    fn map_sequence(
        &self,
        _sequence: &[AminoAcid],
    ) -> Result<Vec<PeptideProteinMapping>, DeNovoError> {
        let _ = self.release.lock().unwrap().recv();
        Ok(Vec::new())
    }
}

/// An export cannot start while the mapping of the same identification runs
#[test]
fn one_heavy_operation_at_a_time() {
    let mut store = store("busy");
    import(&mut store, &["run.novor.csv"]);
    let lock = store.operation_lock().clone();
    let (release, receiver) = std::sync::mpsc::channel();
    let handle = spawn_task("Protein mapping", Progress::new(), move |progress| {
        let order = store.spectrum_identifiers().to_vec();
        let mapper = BlockingMapper {
            release: Mutex::new(receiver),
        };
        map_to_proteins(
            &mut store,
            &order,
            &mapper,
            &MappingSettings::default(),
            progress,
        )
    });
    while !matches!(lock.state(), OperationState::Running(_)) {
        std::thread::sleep(std::time::Duration::from_millis(1));
    }
    let error = lock.begin("tags export").unwrap_err();
    assert_eq!(error.get_kind(), DeNovoErrorKind::Busy);
    drop(release);
    let outcome = handle.wait();
    assert!(outcome.is_completed());
    assert_eq!(lock.state(), OperationState::Completed);
    assert!(lock.begin("tags export").is_ok());
}

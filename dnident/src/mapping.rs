//! Map tags and peptides back to the proteins they could originate from.

use std::collections::BTreeMap;

use context_error::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use dncore::{
    advocate::Advocate,
    aminoacid::AminoAcid,
    error::{DeNovoError, DeNovoErrorKind, deduplicate_warnings},
    sequence::{ModificationMatch, Peptide, Tag},
    spectrum::SpectrumIdentifier,
    system::Mass,
    tolerance::Tolerance,
};

use crate::{
    assumption::ResultAssumption,
    ranking::top_scores,
    spectrum_match::AssumptionMap,
    store::IdentificationStore,
    task::{Progress, TaskOutcome},
};

/// A stretch of a protein matching a tag or sequence
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct PeptideProteinMapping {
    /// The protein accession
    pub accession: String,
    /// The matched protein residues
    pub peptide_sequence: Vec<AminoAcid>,
    /// The zero based start of the match in the protein
    pub index: usize,
    /// The modifications of the matched peptide, sites relative to the peptide
    pub modifications: Vec<ModificationMatch>,
}

/// Something that can find the protein regions matching a tag or sequence
pub trait PeptideMapper: Send + Sync {
    /// The shortest stretch of residues this mapper can look up
    fn min_indexable_length(&self) -> usize;

    /// Find all protein regions matching a tag, the terminal gaps of the tag have to match the
    /// mass of the flanking protein residues within the tolerance
    /// # Errors
    /// A `Database` or `MappingTimeout` error if the underlying database failed or timed out,
    /// any other error only concerns this tag.
    fn map_tag(
        &self,
        tag: &Tag,
        tolerance: Tolerance<Mass>,
    ) -> Result<Vec<PeptideProteinMapping>, DeNovoError>;

    /// Find all protein regions with exactly this sequence
    /// # Errors
    /// A `Database` or `MappingTimeout` error if the underlying database failed or timed out,
    /// any other error only concerns this sequence.
    fn map_sequence(
        &self,
        sequence: &[AminoAcid],
    ) -> Result<Vec<PeptideProteinMapping>, DeNovoError>;
}

/// Which assumptions are mapped
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct MappingSettings {
    /// The score threshold an assumption has to pass
    pub threshold: f64,
    /// If the score has to be at least the threshold (instead of at most)
    pub greater_than: bool,
    /// The number of best scores per advocate per spectrum that are mapped
    pub max_matches_per_spectrum: usize,
    /// The tolerance for matching terminal gaps of tags
    pub fragment_tolerance: Tolerance<Mass>,
    /// The fraction of the cache budget above which the store is asked to release memory, has to
    /// be below the eviction fraction of the store to have any effect
    pub memory_check_fraction: f64,
}

impl Default for MappingSettings {
    fn default() -> Self {
        Self {
            threshold: 0.0,
            greater_than: true,
            max_matches_per_spectrum: 10,
            fragment_tolerance: Tolerance::default(),
            memory_check_fraction: 0.8,
        }
    }
}

/// The result of a mapping run
#[derive(Clone, Debug, Default)]
pub struct MappingOutcome {
    /// If any tag or peptide matched a protein
    pub any_match_found: bool,
    /// If all spectra were processed, `false` after a cancellation
    pub completed: bool,
    /// The number of spectra processed
    pub spectra_processed: usize,
    /// The number of new peptide assumptions derived from tags
    pub derived_peptides: usize,
    /// The number of spectra written to disk to stay below the memory check fraction
    pub spilled_spectra: usize,
    /// Assumptions that could not be mapped, each distinct problem once
    pub warnings: Vec<DeNovoError>,
}

/// Map the assumptions of the given spectra to proteins. For every spectrum and advocate (in
/// priority order) the best scores passing the threshold are mapped. Tags that match yield new
/// peptide assumptions next to the tag, peptides that match get their parent proteins set.
///
/// Cancellation is checked before every spectrum, spectra done at that point keep their
/// mappings and the outcome reports `completed: false`. An assumption the mapper rejects (for
/// example because it carries a modification that is not in the catalog) is skipped and reported
/// in the warnings of the outcome.
/// # Errors
/// A `Busy` error if another heavy operation is running on this identification, if the store
/// failed, or if the mapper reported a `Database` or `MappingTimeout` error.
pub fn map_to_proteins(
    store: &mut IdentificationStore,
    spectrum_order: &[SpectrumIdentifier],
    mapper: &dyn PeptideMapper,
    settings: &MappingSettings,
    progress: &Progress,
) -> Result<MappingOutcome, DeNovoError> {
    let guard = store.operation_lock().begin("protein mapping")?;
    match map_spectra(store, spectrum_order, mapper, settings, progress) {
        Ok(outcome) if !outcome.completed => {
            guard.finish(&TaskOutcome::<()>::Canceled);
            Ok(outcome)
        }
        result => guard.finish_result(result),
    }
}

fn map_spectra(
    store: &mut IdentificationStore,
    spectrum_order: &[SpectrumIdentifier],
    mapper: &dyn PeptideMapper,
    settings: &MappingSettings,
    progress: &Progress,
) -> Result<MappingOutcome, DeNovoError> {
    let mut outcome = MappingOutcome::default();
    progress.start(spectrum_order.len(), "Mapping to proteins");
    for identifier in spectrum_order {
        if progress.is_canceled() {
            info!(
                "Protein mapping canceled after {} of {} spectra",
                outcome.spectra_processed,
                spectrum_order.len()
            );
            outcome.warnings = deduplicate_warnings(std::mem::take(&mut outcome.warnings));
            return Ok(outcome);
        }
        if store.memory_pressure() > settings.memory_check_fraction {
            outcome.spilled_spectra += store.reduce_memory()?;
        }
        if let Some(assumptions) = store.assumptions(identifier)? {
            let mut assumptions = assumptions.clone();
            let (changed, found, derived) = map_spectrum(
                identifier,
                &mut assumptions,
                mapper,
                settings,
                &mut outcome.warnings,
            )?;
            outcome.any_match_found |= found;
            outcome.derived_peptides += derived;
            if changed {
                store.update_assumptions(identifier, assumptions)?;
            }
        }
        outcome.spectra_processed += 1;
        progress.increment();
    }
    outcome.completed = true;
    outcome.warnings = deduplicate_warnings(std::mem::take(&mut outcome.warnings));
    info!(
        "Mapped {} spectra, derived {} peptides from tags",
        outcome.spectra_processed, outcome.derived_peptides
    );
    Ok(outcome)
}

/// Problems of the mapper that stop the whole mapping run
const fn aborts_mapping(kind: DeNovoErrorKind) -> bool {
    matches!(
        kind,
        DeNovoErrorKind::Database | DeNovoErrorKind::MappingTimeout | DeNovoErrorKind::Canceled
    )
}

/// Keep the mappings, or store a problem local to this assumption as warning and go on without
fn local_to_assumption(
    result: Result<Vec<PeptideProteinMapping>, DeNovoError>,
    identifier: &SpectrumIdentifier,
    warnings: &mut Vec<DeNovoError>,
) -> Result<Vec<PeptideProteinMapping>, DeNovoError> {
    match result {
        Ok(mappings) => Ok(mappings),
        Err(error) if aborts_mapping(error.get_kind()) => Err(error),
        Err(error) => {
            warn!("Skipped an assumption of {identifier}: {error}");
            warnings.push(error.add_contexts([Context::show(identifier.to_string())]));
            Ok(Vec::new())
        }
    }
}

/// Map one spectrum, returns if anything changed, if anything matched, and the number of derived
/// peptides
fn map_spectrum(
    identifier: &SpectrumIdentifier,
    assumptions: &mut AssumptionMap,
    mapper: &dyn PeptideMapper,
    settings: &MappingSettings,
    warnings: &mut Vec<DeNovoError>,
) -> Result<(bool, bool, usize), DeNovoError> {
    let mut changed = false;
    let mut found = false;
    let mut derived = 0;
    for advocate in Advocate::PRIORITY {
        let Some(scores) = assumptions.get_mut(&advocate.index()) else {
            continue;
        };
        let selected = top_scores(
            advocate,
            scores.keys().copied(),
            settings.threshold,
            settings.greater_than,
            settings.max_matches_per_spectrum,
        );
        for score in selected {
            let Some(list) = scores.get_mut(&score) else {
                continue;
            };
            let mut new = Vec::new();
            for assumption in list.iter_mut() {
                match assumption {
                    ResultAssumption::Tag { tag, data } => {
                        if tag.longest_unambiguous_run_length() < mapper.min_indexable_length() {
                            continue;
                        }
                        let mappings = local_to_assumption(
                            mapper.map_tag(tag, settings.fragment_tolerance),
                            identifier,
                            warnings,
                        )?;
                        found |= !mappings.is_empty();
                        new.extend(derive_peptides(mappings).into_iter().map(|p| (p, data.clone())));
                    }
                    ResultAssumption::Peptide { peptide, .. } => {
                        if peptide.len() < mapper.min_indexable_length() {
                            continue;
                        }
                        let mappings = local_to_assumption(
                            mapper.map_sequence(peptide.sequence()),
                            identifier,
                            warnings,
                        )?;
                        found |= !mappings.is_empty();
                        let before = peptide.parent_proteins().len();
                        peptide.add_parent_proteins(mappings.into_iter().map(|m| m.accession));
                        changed |= peptide.parent_proteins().len() != before;
                    }
                }
            }
            for (peptide, data) in new {
                // A peptide derived in an earlier run only gains the new accessions
                let existing = list.iter_mut().find_map(|a| match a {
                    ResultAssumption::Peptide { peptide: p, data: d }
                        if p.sequence() == peptide.sequence()
                            && p.modifications() == peptide.modifications()
                            && d.rank == data.rank =>
                    {
                        Some(p)
                    }
                    _ => None,
                });
                if let Some(existing) = existing {
                    let before = existing.parent_proteins().len();
                    existing.add_parent_proteins(peptide.parent_proteins().iter().cloned());
                    changed |= existing.parent_proteins().len() != before;
                } else {
                    debug!("Derived {peptide} from a tag");
                    list.push(ResultAssumption::peptide(peptide, data));
                    derived += 1;
                    changed = true;
                }
            }
        }
    }
    Ok((changed, found, derived))
}

/// One peptide per distinct matched sequence and modifications, carrying all matching accessions
fn derive_peptides(mappings: Vec<PeptideProteinMapping>) -> Vec<Peptide> {
    let mut grouped: BTreeMap<(Vec<AminoAcid>, Vec<ModificationMatch>), Vec<String>> =
        BTreeMap::new();
    for mapping in mappings {
        let mut modifications = mapping.modifications;
        modifications.sort();
        grouped
            .entry((mapping.peptide_sequence, modifications))
            .or_default()
            .push(mapping.accession);
    }
    grouped
        .into_iter()
        .map(|((sequence, modifications), accessions)| {
            let mut peptide = Peptide::new(sequence, modifications);
            peptide.add_parent_proteins(accessions);
            peptide
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assumption::AssumptionData,
        spectrum_match::SpectrumMatch,
        store::CacheSettings,
    };
    use dncore::{aminoacid::parse_sequence, system::da};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Maps every tag and sequence to a single protein and counts the calls
    #[derive(Debug, Default)]
    struct CountingMapper {
        calls: AtomicUsize,
    }

    impl PeptideMapper for CountingMapper {
        fn min_indexable_length(&self) -> usize {
            5
        }

        fn map_tag(
            &self,
            _tag: &Tag,
            _tolerance: Tolerance<Mass>,
        ) -> Result<Vec<PeptideProteinMapping>, DeNovoError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            Ok(vec![PeptideProteinMapping {
                accession: "P1".to_string(),
                peptide_sequence: parse_sequence("GPEPTIDEK").unwrap(),
                index: 3,
                modifications: Vec::new(),
            }])
        }

        fn map_sequence(
            &self,
            sequence: &[AminoAcid],
        ) -> Result<Vec<PeptideProteinMapping>, DeNovoError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            Ok(["P2", "P1", "P2"]
                .iter()
                .map(|accession| PeptideProteinMapping {
                    accession: (*accession).to_string(),
                    peptide_sequence: sequence.to_vec(),
                    index: 0,
                    modifications: Vec::new(),
                })
                .collect())
        }
    }

    fn tag_match(title: &str, sequence: &str) -> SpectrumMatch {
        SpectrumMatch::with_assumptions(
            SpectrumIdentifier::new("run.mgf", title),
            [ResultAssumption::tag(
                Tag::from_gapped_sequence(
                    da(57.02),
                    &parse_sequence(sequence).unwrap(),
                    Vec::new(),
                    da(128.09),
                ),
                AssumptionData::new(Advocate::PepNovo, 5.0, 1, 2, "run.mgf.out"),
            )],
        )
    }

    fn store(name: &str) -> IdentificationStore {
        store_with(name, CacheSettings::default())
    }

    fn store_with(name: &str, settings: CacheSettings) -> IdentificationStore {
        let path = std::env::temp_dir().join(format!("dnident_mapping_{name}_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&path);
        IdentificationStore::open(path, settings).unwrap()
    }

    /// Fails every lookup with the given kind
    #[derive(Debug)]
    struct FailingMapper(DeNovoErrorKind);

    impl PeptideMapper for FailingMapper {
        fn min_indexable_length(&self) -> usize {
            1
        }

        fn map_tag(
            &self,
            tag: &Tag,
            _tolerance: Tolerance<Mass>,
        ) -> Result<Vec<PeptideProteinMapping>, DeNovoError> {
            Err(DeNovoError::new(
                self.0,
                "Tag cannot be mapped",
                "The mapper rejected this tag",
                Context::show(tag.to_string()),
            ))
        }

        fn map_sequence(
            &self,
            _sequence: &[AminoAcid],
        ) -> Result<Vec<PeptideProteinMapping>, DeNovoError> {
            Err(DeNovoError::small(self.0, "Sequence cannot be mapped", "The mapper rejected this sequence"))
        }
    }

    #[test]
    fn short_tags_are_not_mapped() {
        let mut store = store("short");
        store.add_spectrum_matches([tag_match("1", "PEP")]).unwrap();
        let mapper = CountingMapper::default();
        let order = store.spectrum_identifiers().to_vec();
        let outcome =
            map_to_proteins(&mut store, &order, &mapper, &MappingSettings::default(), &Progress::new())
                .unwrap();
        assert!(!outcome.any_match_found);
        assert!(outcome.completed);
        assert_eq!(outcome.derived_peptides, 0);
        assert_eq!(mapper.calls.load(Ordering::Relaxed), 0);
        assert_eq!(store.assumptions(&order[0]).unwrap().unwrap()[&1].values().flatten().count(), 1);
    }

    #[test]
    fn tags_derive_peptides_and_peptides_gain_proteins() {
        let mut store = store("derive");
        let peptide = SpectrumMatch::with_assumptions(
            SpectrumIdentifier::new("run.mgf", "2"),
            [ResultAssumption::peptide(
                Peptide::new(parse_sequence("PEPTIDEK").unwrap(), Vec::new()),
                AssumptionData::new(Advocate::Novor, 80.0, 1, 2, "run.novor.csv"),
            )],
        );
        store
            .add_spectrum_matches([tag_match("1", "PEPTIDE"), peptide])
            .unwrap();
        let mapper = CountingMapper::default();
        let order = store.spectrum_identifiers().to_vec();
        let settings = MappingSettings::default();
        let outcome = map_to_proteins(&mut store, &order, &mapper, &settings, &Progress::new()).unwrap();
        assert!(outcome.any_match_found);
        assert_eq!(outcome.derived_peptides, 1);

        let tags = store.assumptions(&order[0]).unwrap().unwrap()[&Advocate::PepNovo.index()].clone();
        let list = tags.values().next().unwrap();
        assert_eq!(list.len(), 2);
        assert!(matches!(list[0], ResultAssumption::Tag { .. }));
        let derived = list[1].as_peptide().unwrap();
        assert_eq!(derived.sequence_string(), "GPEPTIDEK");
        assert_eq!(derived.parent_proteins(), ["P1"]);
        assert_eq!(list[1].score(), 5.0);

        let peptides = store.assumptions(&order[1]).unwrap().unwrap()[&Advocate::Novor.index()].clone();
        let peptide = peptides.values().next().unwrap()[0].as_peptide().unwrap().clone();
        assert_eq!(peptide.parent_proteins(), ["P1", "P2"]);

        // Mapping again does not duplicate derived peptides
        let outcome = map_to_proteins(&mut store, &order, &mapper, &settings, &Progress::new()).unwrap();
        assert_eq!(outcome.derived_peptides, 0);
    }

    #[test]
    fn threshold_limits_mapping() {
        let mut store = store("threshold");
        store.add_spectrum_matches([tag_match("1", "PEPTIDE")]).unwrap();
        let mapper = CountingMapper::default();
        let order = store.spectrum_identifiers().to_vec();
        let settings = MappingSettings {
            threshold: 10.0,
            ..MappingSettings::default()
        };
        let outcome = map_to_proteins(&mut store, &order, &mapper, &settings, &Progress::new()).unwrap();
        assert!(!outcome.any_match_found);
        assert_eq!(mapper.calls.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn canceled_mapping_keeps_finished_spectra() {
        let mut store = store("cancel");
        store.add_spectrum_matches([tag_match("1", "PEPTIDE")]).unwrap();
        let order = store.spectrum_identifiers().to_vec();
        let progress = Progress::new();
        progress.cancel();
        let outcome = map_to_proteins(
            &mut store,
            &order,
            &CountingMapper::default(),
            &MappingSettings::default(),
            &progress,
        )
        .unwrap();
        assert!(!outcome.completed);
        assert_eq!(outcome.spectra_processed, 0);
        assert_eq!(store.operation_lock().state(), crate::task::OperationState::Canceled);
        assert_eq!(store.assumptions(&order[0]).unwrap().unwrap()[&1].values().flatten().count(), 1);
    }

    #[test]
    fn rejected_assumptions_become_warnings() {
        let mut store = store("rejected");
        store
            .add_spectrum_matches([tag_match("1", "PEPTIDE"), tag_match("2", "PEPTIDE")])
            .unwrap();
        let order = store.spectrum_identifiers().to_vec();
        let outcome = map_to_proteins(
            &mut store,
            &order,
            &FailingMapper(DeNovoErrorKind::UnmappedModification),
            &MappingSettings::default(),
            &Progress::new(),
        )
        .unwrap();
        assert!(outcome.completed);
        assert_eq!(outcome.spectra_processed, 2);
        assert!(!outcome.any_match_found);
        // The same problem on two spectra is reported once
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(
            outcome.warnings[0].get_kind(),
            DeNovoErrorKind::UnmappedModification
        );
        assert_eq!(store.operation_lock().state(), crate::task::OperationState::Completed);
    }

    #[test]
    fn database_problems_stop_mapping() {
        for kind in [DeNovoErrorKind::Database, DeNovoErrorKind::MappingTimeout] {
            let mut store = store(&format!("fatal_{kind:?}"));
            store.add_spectrum_matches([tag_match("1", "PEPTIDE")]).unwrap();
            let order = store.spectrum_identifiers().to_vec();
            let error = map_to_proteins(
                &mut store,
                &order,
                &FailingMapper(kind),
                &MappingSettings::default(),
                &Progress::new(),
            )
            .unwrap_err();
            assert_eq!(error.get_kind(), kind);
            assert_eq!(store.operation_lock().state(), crate::task::OperationState::Failed);
        }
    }

    #[test]
    fn memory_is_released_while_mapping() {
        let spectra = || (0..20).map(|i| tag_match(&i.to_string(), "PEPTIDE"));
        let mut measure = store("measure");
        measure.add_spectrum_matches(spectra()).unwrap();
        let size = measure.resident_size();
        drop(measure);

        // Everything fits, but above the memory check fraction
        let mut store = store_with(
            "pressure",
            CacheSettings {
                memory_budget: size,
                eviction_fraction: 1.0,
            },
        );
        store.add_spectrum_matches(spectra()).unwrap();
        assert_eq!(store.resident_count(), 20);
        let order = store.spectrum_identifiers().to_vec();
        let mapper = CountingMapper::default();
        let outcome =
            map_to_proteins(&mut store, &order, &mapper, &MappingSettings::default(), &Progress::new())
                .unwrap();
        assert!(outcome.completed);
        assert!(outcome.spilled_spectra > 0);
        assert_eq!(outcome.derived_peptides, 20);
        assert!(store.resident_count() < 20);
        for identifier in &order {
            let tags = store.assumptions(identifier).unwrap().unwrap()[&Advocate::PepNovo.index()].clone();
            let list = tags.values().next().unwrap();
            assert_eq!(list.len(), 2);
            assert_eq!(list[1].as_peptide().unwrap().sequence_string(), "GPEPTIDEK");
        }
    }

    #[test]
    fn mapping_is_rejected_while_busy() {
        let mut store = store("busy");
        let order = store.spectrum_identifiers().to_vec();
        let guard = store.operation_lock().begin("export").unwrap();
        let error = map_to_proteins(
            &mut store,
            &order,
            &CountingMapper::default(),
            &MappingSettings::default(),
            &Progress::new(),
        )
        .unwrap_err();
        assert_eq!(error.get_kind(), dncore::error::DeNovoErrorKind::Busy);
        guard.finish(&TaskOutcome::Completed(()));
    }
}

//! All assumptions for a single spectrum, grouped per advocate and score.

use std::collections::BTreeMap;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use dncore::{
    advocate::Advocate,
    space::{Space, UsedSpace},
    spectrum::SpectrumIdentifier,
};

use crate::assumption::ResultAssumption;

/// The assumptions of one advocate, keyed by score. Multiple assumptions can tie on a score.
pub type ScoreMap = BTreeMap<OrderedFloat<f64>, Vec<ResultAssumption>>;

/// The assumptions of all advocates, keyed by [`Advocate::index`]
pub type AssumptionMap = BTreeMap<usize, ScoreMap>;

/// The assumptions found for one spectrum
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct SpectrumMatch {
    identifier: SpectrumIdentifier,
    assumptions: AssumptionMap,
}

impl SpectrumMatch {
    /// Create an empty match for this spectrum
    pub fn new(identifier: SpectrumIdentifier) -> Self {
        Self {
            identifier,
            assumptions: AssumptionMap::new(),
        }
    }

    /// Create a match with the given assumptions
    pub fn with_assumptions(
        identifier: SpectrumIdentifier,
        assumptions: impl IntoIterator<Item = ResultAssumption>,
    ) -> Self {
        let mut output = Self::new(identifier);
        for assumption in assumptions {
            output.add_assumption(assumption);
        }
        output
    }

    /// The spectrum
    pub const fn identifier(&self) -> &SpectrumIdentifier {
        &self.identifier
    }

    /// All assumptions
    pub const fn assumptions(&self) -> &AssumptionMap {
        &self.assumptions
    }

    /// Take the assumptions out
    pub fn into_assumptions(self) -> AssumptionMap {
        self.assumptions
    }

    /// Add a single assumption under its advocate and score
    pub fn add_assumption(&mut self, assumption: ResultAssumption) {
        self.assumptions
            .entry(assumption.advocate().index())
            .or_default()
            .entry(OrderedFloat(assumption.score()))
            .or_default()
            .push(assumption);
    }

    /// Merge other assumptions into these, the per score lists are concatenated
    pub fn merge(&mut self, other: AssumptionMap) {
        for (advocate, scores) in other {
            let target = self.assumptions.entry(advocate).or_default();
            for (score, mut list) in scores {
                target.entry(score).or_default().append(&mut list);
            }
        }
    }

    /// The assumptions of a single advocate
    pub fn advocate_assumptions(&self, advocate: Advocate) -> Option<&ScoreMap> {
        self.assumptions.get(&advocate.index())
    }

    /// Iterate over all assumptions, by advocate index and ascending score
    pub fn iter(&self) -> impl Iterator<Item = &ResultAssumption> {
        self.assumptions.values().flat_map(|s| s.values().flatten())
    }

    /// The total number of assumptions
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// If there are no assumptions
    pub fn is_empty(&self) -> bool {
        self.assumptions.values().all(|s| s.values().all(Vec::is_empty))
    }
}

impl Space for SpectrumMatch {
    fn space(&self) -> UsedSpace {
        (self.identifier.space() + self.assumptions.space()).set_total::<Self>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assumption::AssumptionData;
    use dncore::{aminoacid::parse_sequence, sequence::Peptide};

    fn peptide(advocate: Advocate, score: f64, sequence: &str) -> ResultAssumption {
        ResultAssumption::peptide(
            Peptide::new(parse_sequence(sequence).unwrap(), Vec::new()),
            AssumptionData::new(advocate, score, 1, 2, "file"),
        )
    }

    #[test]
    fn ties_are_kept() {
        let mut m = SpectrumMatch::new(SpectrumIdentifier::new("run.mgf", "1"));
        m.add_assumption(peptide(Advocate::Novor, 50.0, "PEPTIDE"));
        m.add_assumption(peptide(Advocate::Novor, 50.0, "PEPTLDE"));
        m.add_assumption(peptide(Advocate::PNovo, 12.0, "PEPTIDE"));
        assert_eq!(m.len(), 3);
        assert_eq!(
            m.advocate_assumptions(Advocate::Novor).unwrap()[&OrderedFloat(50.0)].len(),
            2
        );
    }

    #[test]
    fn merge_unions_lists() {
        let id = SpectrumIdentifier::new("run.mgf", "1");
        let mut a = SpectrumMatch::with_assumptions(id.clone(), [peptide(Advocate::Novor, 50.0, "PEPTIDE")]);
        let b = SpectrumMatch::with_assumptions(
            id,
            [
                peptide(Advocate::Novor, 50.0, "PEPTLDE"),
                peptide(Advocate::Novor, 20.0, "PEPTLDE"),
            ],
        );
        a.merge(b.into_assumptions());
        assert_eq!(a.len(), 3);
        assert!(!a.is_empty());
    }
}

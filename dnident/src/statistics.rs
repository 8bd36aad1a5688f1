//! Running ranges of the imported values, used to scale score and gap columns for display.

use serde::{Deserialize, Serialize};

use dncore::advocate::Advocate;

use crate::assumption::ResultAssumption;

/// A running minimum and maximum
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct ScoreRange {
    min: Option<f64>,
    max: Option<f64>,
}

impl ScoreRange {
    /// Include a value
    pub fn update(&mut self, value: f64) {
        if value.is_nan() {
            return;
        }
        self.min = Some(self.min.map_or(value, |m| m.min(value)));
        self.max = Some(self.max.map_or(value, |m| m.max(value)));
    }

    /// Include another range
    pub fn merge(&mut self, other: Self) {
        if let Some(min) = other.min {
            self.update(min);
        }
        if let Some(max) = other.max {
            self.update(max);
        }
    }

    /// The lowest value seen
    pub const fn min(&self) -> Option<f64> {
        self.min
    }

    /// The highest value seen
    pub const fn max(&self) -> Option<f64> {
        self.max
    }
}

/// The ranges of all values needed for display scaling, only updated while importing
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct ScoreStatistics {
    scores: [ScoreRange; 4],
    n_terminal_gap: ScoreRange,
    c_terminal_gap: ScoreRange,
    max_identification_charge: usize,
    max_results_per_spectrum: usize,
}

impl ScoreStatistics {
    /// Include a single assumption
    pub fn record(&mut self, assumption: &ResultAssumption) {
        self.scores[assumption.advocate().index()].update(assumption.score());
        self.max_identification_charge = self
            .max_identification_charge
            .max(assumption.identification_charge());
        if let ResultAssumption::Tag { tag, .. } = assumption {
            self.n_terminal_gap.update(tag.n_terminal_gap().value);
            self.c_terminal_gap.update(tag.c_terminal_gap().value);
        }
    }

    /// Register the number of results for a single spectrum
    pub fn record_spectrum(&mut self, results: usize) {
        self.max_results_per_spectrum = self.max_results_per_spectrum.max(results);
    }

    /// Include the statistics gathered elsewhere
    pub fn merge(&mut self, other: &Self) {
        for (own, other) in self.scores.iter_mut().zip(other.scores) {
            own.merge(other);
        }
        self.n_terminal_gap.merge(other.n_terminal_gap);
        self.c_terminal_gap.merge(other.c_terminal_gap);
        self.max_identification_charge = self
            .max_identification_charge
            .max(other.max_identification_charge);
        self.max_results_per_spectrum = self
            .max_results_per_spectrum
            .max(other.max_results_per_spectrum);
    }

    /// The range of the scores of this advocate
    pub const fn scores(&self, advocate: Advocate) -> ScoreRange {
        self.scores[advocate.index()]
    }

    /// The range of N terminal gaps of all tags in dalton
    pub const fn n_terminal_gap(&self) -> ScoreRange {
        self.n_terminal_gap
    }

    /// The range of C terminal gaps of all tags in dalton
    pub const fn c_terminal_gap(&self) -> ScoreRange {
        self.c_terminal_gap
    }

    /// The highest identification charge
    pub const fn max_identification_charge(&self) -> usize {
        self.max_identification_charge
    }

    /// The most results seen for a single spectrum
    pub const fn max_results_per_spectrum(&self) -> usize {
        self.max_results_per_spectrum
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assumption::AssumptionData;
    use dncore::{aminoacid::parse_sequence, sequence::Tag, system::da};

    #[test]
    fn tracks_ranges() {
        let mut statistics = ScoreStatistics::default();
        for (score, n, c, charge) in [(0.5, 100.0, 0.0, 2), (0.01, 250.0, 12.0, 3)] {
            statistics.record(&ResultAssumption::tag(
                Tag::from_gapped_sequence(
                    da(n),
                    &parse_sequence("PEP").unwrap(),
                    Vec::new(),
                    da(c),
                ),
                AssumptionData::new(Advocate::DirecTag, score, 1, charge, "a.tags"),
            ));
        }
        statistics.record_spectrum(2);
        let scores = statistics.scores(Advocate::DirecTag);
        assert_eq!((scores.min(), scores.max()), (Some(0.01), Some(0.5)));
        assert_eq!(statistics.n_terminal_gap().max(), Some(250.0));
        assert_eq!(statistics.c_terminal_gap().min(), Some(0.0));
        assert_eq!(statistics.max_identification_charge(), 3);
        assert_eq!(statistics.scores(Advocate::Novor).min(), None);

        let mut total = ScoreStatistics::default();
        total.merge(&statistics);
        assert_eq!(total, statistics);
    }
}

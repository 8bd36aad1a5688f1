//! The de novo sequencing algorithms whose results can be aggregated.

use std::{cmp::Ordering, fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

/// A de novo sequencing algorithm
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
pub enum Advocate {
    /// DirecTag, reports tags scored with an e-value
    DirecTag,
    /// PepNovo+, reports tags scored with a rank score
    PepNovo,
    /// pNovo+, reports peptides
    PNovo,
    /// Novor, reports peptides
    Novor,
}

impl Advocate {
    /// All advocates in the fixed priority order used when results of multiple algorithms compete
    pub const PRIORITY: [Self; 4] = [Self::DirecTag, Self::PepNovo, Self::PNovo, Self::Novor];

    /// The stable numeric index of this advocate, used as map key
    pub const fn index(self) -> usize {
        match self {
            Self::DirecTag => 0,
            Self::PepNovo => 1,
            Self::PNovo => 2,
            Self::Novor => 3,
        }
    }

    /// Get the advocate with the given index
    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::DirecTag),
            1 => Some(Self::PepNovo),
            2 => Some(Self::PNovo),
            3 => Some(Self::Novor),
            _ => None,
        }
    }

    /// If a lower score is a better score for this algorithm
    pub const fn better_is_lower(self) -> bool {
        matches!(self, Self::DirecTag)
    }

    /// The name of the algorithm as used in exports
    pub const fn name(self) -> &'static str {
        match self {
            Self::DirecTag => "DirecTag",
            Self::PepNovo => "PepNovo+",
            Self::PNovo => "pNovo+",
            Self::Novor => "Novor",
        }
    }

    /// Order two scores so that the better one is sorted first
    pub fn compare_scores(self, a: f64, b: f64) -> Ordering {
        if self.better_is_lower() {
            a.total_cmp(&b)
        } else {
            b.total_cmp(&a)
        }
    }

    /// Check if score `a` is strictly better than score `b`
    pub fn is_better(self, a: f64, b: f64) -> bool {
        self.compare_scores(a, b) == Ordering::Less
    }
}

impl Display for Advocate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Advocate {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().trim_end_matches('+') {
            "directag" => Ok(Self::DirecTag),
            "pepnovo" => Ok(Self::PepNovo),
            "pnovo" => Ok(Self::PNovo),
            "novor" => Ok(Self::Novor),
            _ => Err(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_round_trip() {
        for advocate in Advocate::PRIORITY {
            assert_eq!(Advocate::from_index(advocate.index()), Some(advocate));
        }
        assert_eq!(Advocate::from_index(4), None);
    }

    #[test]
    fn score_direction() {
        assert!(Advocate::DirecTag.is_better(0.01, 0.5));
        assert!(Advocate::PepNovo.is_better(40.0, 12.0));
        assert!(!Advocate::Novor.is_better(12.0, 12.0));
    }

    #[test]
    fn parse_names() {
        assert_eq!("PepNovo+".parse(), Ok(Advocate::PepNovo));
        assert_eq!("pnovo".parse(), Ok(Advocate::PNovo));
        assert_eq!("mascot".parse::<Advocate>(), Err(()));
    }
}

//! A single sequencing hypothesis for a single spectrum.

use serde::{Deserialize, Serialize};

use dncore::{
    advocate::Advocate,
    sequence::{Peptide, Tag},
    space::{Space, UsedSpace},
};

/// The information shared by both kinds of assumptions
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct AssumptionData {
    /// The algorithm that produced this assumption
    pub advocate: Advocate,
    /// The score, always interpret through [`Advocate::compare_scores`]
    pub score: f64,
    /// The one based rank as reported by the algorithm
    pub rank: usize,
    /// The charge this hypothesis was identified with
    pub identification_charge: usize,
    /// The name of the file this assumption was read from
    pub source_file: String,
    /// Per residue confidences, one list per residue
    pub amino_acid_scores: Option<Vec<Vec<f64>>>,
}

impl AssumptionData {
    /// Create new data without residue scores
    pub fn new(
        advocate: Advocate,
        score: f64,
        rank: usize,
        identification_charge: usize,
        source_file: impl Into<String>,
    ) -> Self {
        Self {
            advocate,
            score,
            rank,
            identification_charge,
            source_file: source_file.into(),
            amino_acid_scores: None,
        }
    }
}

/// A sequencing hypothesis: either a tag or a full peptide
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum ResultAssumption {
    /// A partial sequence flanked by mass gaps
    Tag {
        /// The tag
        tag: Tag,
        /// The shared data
        data: AssumptionData,
    },
    /// A fully resolved sequence
    Peptide {
        /// The peptide
        peptide: Peptide,
        /// The shared data
        data: AssumptionData,
    },
}

impl ResultAssumption {
    /// Create a tag assumption
    pub const fn tag(tag: Tag, data: AssumptionData) -> Self {
        Self::Tag { tag, data }
    }

    /// Create a peptide assumption
    pub const fn peptide(peptide: Peptide, data: AssumptionData) -> Self {
        Self::Peptide { peptide, data }
    }

    /// The tag, if this is a tag assumption
    pub const fn as_tag(&self) -> Option<&Tag> {
        match self {
            Self::Tag { tag, .. } => Some(tag),
            Self::Peptide { .. } => None,
        }
    }

    /// The peptide, if this is a peptide assumption
    pub const fn as_peptide(&self) -> Option<&Peptide> {
        match self {
            Self::Peptide { peptide, .. } => Some(peptide),
            Self::Tag { .. } => None,
        }
    }

    /// The shared data
    pub const fn data(&self) -> &AssumptionData {
        match self {
            Self::Tag { data, .. } | Self::Peptide { data, .. } => data,
        }
    }

    /// The shared data, mutable
    pub const fn data_mut(&mut self) -> &mut AssumptionData {
        match self {
            Self::Tag { data, .. } | Self::Peptide { data, .. } => data,
        }
    }

    /// The algorithm that produced this
    pub const fn advocate(&self) -> Advocate {
        self.data().advocate
    }

    /// The score
    pub const fn score(&self) -> f64 {
        self.data().score
    }

    /// The rank
    pub const fn rank(&self) -> usize {
        self.data().rank
    }

    /// The identification charge
    pub const fn identification_charge(&self) -> usize {
        self.data().identification_charge
    }

    /// The per residue confidences, if reported
    pub fn amino_acid_scores(&self) -> Option<&[Vec<f64>]> {
        self.data().amino_acid_scores.as_deref()
    }

    /// The sequence for display, with modifications and (for tags) the gap masses
    pub fn sequence_string(&self) -> String {
        match self {
            Self::Tag { tag, .. } => tag.to_string(),
            Self::Peptide { peptide, .. } => peptide.modified_sequence(),
        }
    }

    /// The longest contiguous run of residues as one letter codes, the whole sequence for peptides
    pub fn longest_amino_acid_run(&self) -> String {
        match self {
            Self::Tag { tag, .. } => tag.longest_amino_acid_sequence(),
            Self::Peptide { peptide, .. } => peptide.sequence_string(),
        }
    }

    /// Check if the score of this assumption passes the threshold
    pub fn passes_threshold(&self, threshold: f64, greater_than: bool) -> bool {
        if greater_than {
            self.score() >= threshold
        } else {
            self.score() <= threshold
        }
    }
}

impl Space for AssumptionData {
    fn space(&self) -> UsedSpace {
        (self.advocate.space()
            + self.score.space()
            + self.rank.space()
            + self.identification_charge.space()
            + self.source_file.space()
            + self.amino_acid_scores.space())
        .set_total::<Self>()
    }
}

impl Space for ResultAssumption {
    fn space(&self) -> UsedSpace {
        match self {
            Self::Tag { tag, data } => tag.space() + data.space(),
            Self::Peptide { peptide, data } => peptide.space() + data.space(),
        }
        .set_total::<Self>()
    }
}

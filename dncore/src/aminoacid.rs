//! Amino acids and the masses needed to build fragment ladders.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::system::{Mass, MassOverCharge, charge, da};

/// The mass of a proton
pub const PROTON: Mass = da(1.007_276_466_88);
/// The monoisotopic mass of water
pub const WATER: Mass = da(18.010_564_683_7);
/// The monoisotopic mass of ammonia
pub const AMMONIA: Mass = da(17.026_549_101);
/// The monoisotopic mass of carbon monoxide
pub const CARBON_MONOXIDE: Mass = da(27.994_914_619_4);
/// The monoisotopic mass of a hydrogen atom
pub const HYDROGEN: Mass = da(1.007_825_032_07);

/// An amino acid, including the ambiguous codes that de novo tools may report
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[expect(missing_docs)]
pub enum AminoAcid {
    Alanine,
    Arginine,
    Asparagine,
    AsparticAcid,
    Cysteine,
    Glutamine,
    GlutamicAcid,
    Glycine,
    Histidine,
    Isoleucine,
    Leucine,
    Lysine,
    Methionine,
    Phenylalanine,
    Proline,
    Serine,
    Threonine,
    Tryptophan,
    Tyrosine,
    Valine,
    Selenocysteine,
    Pyrrolysine,
    /// B: asparagine or aspartic acid
    AmbiguousAsparagine,
    /// Z: glutamine or glutamic acid
    AmbiguousGlutamine,
    /// J: leucine or isoleucine
    AmbiguousLeucine,
    /// X: any amino acid
    Unknown,
}

impl AminoAcid {
    /// Parse a one letter code, case insensitive
    pub const fn from_char(c: char) -> Option<Self> {
        Some(match c.to_ascii_uppercase() {
            'A' => Self::Alanine,
            'R' => Self::Arginine,
            'N' => Self::Asparagine,
            'D' => Self::AsparticAcid,
            'C' => Self::Cysteine,
            'Q' => Self::Glutamine,
            'E' => Self::GlutamicAcid,
            'G' => Self::Glycine,
            'H' => Self::Histidine,
            'I' => Self::Isoleucine,
            'L' => Self::Leucine,
            'K' => Self::Lysine,
            'M' => Self::Methionine,
            'F' => Self::Phenylalanine,
            'P' => Self::Proline,
            'S' => Self::Serine,
            'T' => Self::Threonine,
            'W' => Self::Tryptophan,
            'Y' => Self::Tyrosine,
            'V' => Self::Valine,
            'U' => Self::Selenocysteine,
            'O' => Self::Pyrrolysine,
            'B' => Self::AmbiguousAsparagine,
            'Z' => Self::AmbiguousGlutamine,
            'J' => Self::AmbiguousLeucine,
            'X' => Self::Unknown,
            _ => return None,
        })
    }

    /// The one letter code
    pub const fn char(self) -> char {
        match self {
            Self::Alanine => 'A',
            Self::Arginine => 'R',
            Self::Asparagine => 'N',
            Self::AsparticAcid => 'D',
            Self::Cysteine => 'C',
            Self::Glutamine => 'Q',
            Self::GlutamicAcid => 'E',
            Self::Glycine => 'G',
            Self::Histidine => 'H',
            Self::Isoleucine => 'I',
            Self::Leucine => 'L',
            Self::Lysine => 'K',
            Self::Methionine => 'M',
            Self::Phenylalanine => 'F',
            Self::Proline => 'P',
            Self::Serine => 'S',
            Self::Threonine => 'T',
            Self::Tryptophan => 'W',
            Self::Tyrosine => 'Y',
            Self::Valine => 'V',
            Self::Selenocysteine => 'U',
            Self::Pyrrolysine => 'O',
            Self::AmbiguousAsparagine => 'B',
            Self::AmbiguousGlutamine => 'Z',
            Self::AmbiguousLeucine => 'J',
            Self::Unknown => 'X',
        }
    }

    /// The monoisotopic residue mass, for the ambiguous codes the mean of the options is used
    pub const fn monoisotopic_mass(self) -> Mass {
        da(match self {
            Self::Alanine => 71.037_113_805,
            Self::Arginine => 156.101_111_050,
            Self::Asparagine => 114.042_927_470,
            Self::AsparticAcid => 115.026_943_065,
            Self::Cysteine => 103.009_184_505,
            Self::Glutamine => 128.058_577_540,
            Self::GlutamicAcid => 129.042_593_135,
            Self::Glycine => 57.021_463_735,
            Self::Histidine => 137.058_911_875,
            Self::Isoleucine | Self::Leucine | Self::AmbiguousLeucine => 113.084_064_015,
            Self::Lysine => 128.094_963_050,
            Self::Methionine => 131.040_484_645,
            Self::Phenylalanine => 147.068_413_945,
            Self::Proline => 97.052_763_875,
            Self::Serine => 87.032_028_435,
            Self::Threonine => 101.047_678_505,
            Self::Tryptophan => 186.079_312_980,
            Self::Tyrosine => 163.063_328_575,
            Self::Valine => 99.068_413_945,
            Self::Selenocysteine => 150.953_633_405,
            Self::Pyrrolysine => 237.147_726_925,
            Self::AmbiguousAsparagine => 114.534_935_268,
            Self::AmbiguousGlutamine => 128.550_585_338,
            Self::Unknown => 118.805_716_044,
        })
    }

    /// If this code stands for more than one amino acid
    pub const fn is_ambiguous(self) -> bool {
        matches!(
            self,
            Self::AmbiguousAsparagine
                | Self::AmbiguousGlutamine
                | Self::AmbiguousLeucine
                | Self::Unknown
        )
    }

    /// The m/z of the singly charged immonium ion
    pub fn immonium_mz(self) -> MassOverCharge {
        (self.monoisotopic_mass() - CARBON_MONOXIDE + PROTON) / charge(1)
    }

    /// If a residue of this type can lose water (S, T, E, D)
    pub const fn can_lose_water(self) -> bool {
        matches!(
            self,
            Self::Serine | Self::Threonine | Self::GlutamicAcid | Self::AsparticAcid
        )
    }

    /// If a residue of this type can lose ammonia (R, K, N, Q)
    pub const fn can_lose_ammonia(self) -> bool {
        matches!(
            self,
            Self::Arginine | Self::Lysine | Self::Asparagine | Self::Glutamine
        )
    }
}

impl Display for AminoAcid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.char())
    }
}

/// Parse a sequence of one letter codes, returns `None` if any character is not an amino acid.
pub fn parse_sequence(text: &str) -> Option<Vec<AminoAcid>> {
    text.chars().map(AminoAcid::from_char).collect()
}

/// Write a sequence as one letter codes
pub fn sequence_to_string(sequence: &[AminoAcid]) -> String {
    sequence.iter().map(|aa| aa.char()).collect()
}

//! The canonical modification vocabulary of a session.
//!
//! Every tool has its own way of writing modifications, these are all translated to the names
//! in a [`ModificationCatalog`] before they are stored. The catalog is created once per session
//! and handed to every component that needs to resolve a modification.

use std::{collections::BTreeMap, io::Read, path::Path};

use context_error::*;
use serde::{Deserialize, Serialize};

use crate::{
    aminoacid::{AminoAcid, WATER},
    error::{DeNovoError, DeNovoErrorKind, file_context, io_error},
    system::{Mass, MassOverCharge, da, mz},
};

/// Where on a peptide a modification can be placed
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
pub enum ModificationPosition {
    /// On any matching residue
    #[default]
    Anywhere,
    /// Only on the N terminal residue of the peptide
    NTerminal,
    /// Only on the C terminal residue of the peptide
    CTerminal,
}

/// A single modification
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Modification {
    /// The canonical name
    pub name: String,
    /// The monoisotopic mass shift
    pub mass: Mass,
    /// The residues this modification can be placed on, empty means any residue
    #[serde(default)]
    pub targets: Vec<AminoAcid>,
    /// The position restriction
    #[serde(default)]
    pub position: ModificationPosition,
    /// Neutral losses specific to this modification (eg phosphoric acid for phosphorylation)
    #[serde(default)]
    pub neutral_losses: Vec<Mass>,
    /// The m/z of reporter ions released by this modification
    #[serde(default)]
    pub reporter_ions: Vec<MassOverCharge>,
}

impl Modification {
    /// Create a new modification on the given residues
    pub fn new(
        name: impl Into<String>,
        mass: Mass,
        targets: impl IntoIterator<Item = AminoAcid>,
        position: ModificationPosition,
    ) -> Self {
        Self {
            name: name.into(),
            mass,
            targets: targets.into_iter().collect(),
            position,
            neutral_losses: Vec::new(),
            reporter_ions: Vec::new(),
        }
    }

    /// Add a neutral loss
    #[must_use]
    pub fn with_neutral_loss(mut self, loss: Mass) -> Self {
        self.neutral_losses.push(loss);
        self
    }

    /// Add reporter ions
    #[must_use]
    pub fn with_reporter_ions(mut self, ions: impl IntoIterator<Item = MassOverCharge>) -> Self {
        self.reporter_ions.extend(ions);
        self
    }

    /// Check if this modification can be placed on the given residue, `site` is one based.
    pub fn can_be_placed(&self, residue: AminoAcid, site: usize, length: usize) -> bool {
        let position = match self.position {
            ModificationPosition::Anywhere => true,
            ModificationPosition::NTerminal => site == 1,
            ModificationPosition::CTerminal => site == length,
        };
        position && (self.targets.is_empty() || self.targets.contains(&residue))
    }

    /// If this modification sits on a terminus
    pub const fn is_terminal(&self) -> bool {
        !matches!(self.position, ModificationPosition::Anywhere)
    }
}

/// The modifications known in a session, by canonical name
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct ModificationCatalog {
    modifications: BTreeMap<String, Modification>,
}

impl ModificationCatalog {
    /// Create a catalog from the given modifications, later definitions overwrite earlier ones
    /// with the same name.
    pub fn new(modifications: impl IntoIterator<Item = Modification>) -> Self {
        Self {
            modifications: modifications
                .into_iter()
                .map(|m| (m.name.clone(), m))
                .collect(),
        }
    }

    /// A catalog with the commonly searched modifications
    pub fn common() -> Self {
        use AminoAcid::*;
        use ModificationPosition::*;

        Self::new([
            Modification::new("Carbamidomethylation of C", da(57.021_464), [Cysteine], Anywhere),
            Modification::new("Oxidation of M", da(15.994_915), [Methionine], Anywhere),
            Modification::new("Acetylation of peptide N-term", da(42.010_565), [], NTerminal),
            Modification::new("Acetylation of K", da(42.010_565), [Lysine], Anywhere),
            Modification::new("Deamidation of N", da(0.984_016), [Asparagine], Anywhere),
            Modification::new("Deamidation of Q", da(0.984_016), [Glutamine], Anywhere),
            Modification::new("Pyrolidone from Q", da(-17.026_549), [Glutamine], NTerminal),
            Modification::new("Pyrolidone from E", -WATER, [GlutamicAcid], NTerminal),
            Modification::new("Phosphorylation of S", da(79.966_331), [Serine], Anywhere)
                .with_neutral_loss(da(97.976_896)),
            Modification::new("Phosphorylation of T", da(79.966_331), [Threonine], Anywhere)
                .with_neutral_loss(da(97.976_896)),
            Modification::new("Phosphorylation of Y", da(79.966_331), [Tyrosine], Anywhere),
            Modification::new("Methylation of K", da(14.015_650), [Lysine], Anywhere),
            Modification::new("TMT 6-plex of K", da(229.162_932), [Lysine], Anywhere)
                .with_reporter_ions(TMT_6_PLEX),
            Modification::new("TMT 6-plex of peptide N-term", da(229.162_932), [], NTerminal)
                .with_reporter_ions(TMT_6_PLEX),
            Modification::new("iTRAQ 4-plex of K", da(144.102_063), [Lysine], Anywhere)
                .with_reporter_ions(ITRAQ_4_PLEX),
            Modification::new("iTRAQ 4-plex of peptide N-term", da(144.102_063), [], NTerminal)
                .with_reporter_ions(ITRAQ_4_PLEX),
        ])
    }

    /// Read a catalog from a JSON list of modifications
    /// # Errors
    /// If the file could not be opened or does not contain a valid list of modifications.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, DeNovoError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .map_err(|e| io_error(path, "Could not open modification catalog", &e))?;
        Self::from_json_reader(std::io::BufReader::new(file))
            .map_err(|e| e.replace_context(file_context(path)))
    }

    /// Read a catalog from a JSON list of modifications
    /// # Errors
    /// If the reader does not contain a valid list of modifications.
    pub fn from_json_reader(reader: impl Read) -> Result<Self, DeNovoError> {
        let modifications: Vec<Modification> = serde_json::from_reader(reader).map_err(|e| {
            DeNovoError::small(
                DeNovoErrorKind::Configuration,
                "Invalid modification catalog",
                e.to_string(),
            )
        })?;
        Ok(Self::new(modifications))
    }

    /// Get a modification by its canonical name
    pub fn get(&self, name: &str) -> Option<&Modification> {
        self.modifications.get(name)
    }

    /// Check if the catalog contains a modification with this name
    pub fn contains(&self, name: &str) -> bool {
        self.modifications.contains_key(name)
    }

    /// The mass of the named modification
    pub fn mass(&self, name: &str) -> Option<Mass> {
        self.get(name).map(|m| m.mass)
    }

    /// Add (or overwrite) a modification
    pub fn insert(&mut self, modification: Modification) {
        self.modifications
            .insert(modification.name.clone(), modification);
    }

    /// Iterate over all modifications sorted by name
    pub fn iter(&self) -> impl Iterator<Item = &Modification> {
        self.modifications.values()
    }

    /// The number of modifications
    pub fn len(&self) -> usize {
        self.modifications.len()
    }

    /// If the catalog is empty
    pub fn is_empty(&self) -> bool {
        self.modifications.is_empty()
    }
}

const TMT_6_PLEX: [MassOverCharge; 6] = [
    mz(126.127_726),
    mz(127.124_761),
    mz(128.134_436),
    mz(129.131_471),
    mz(130.141_145),
    mz(131.138_180),
];

const ITRAQ_4_PLEX: [MassOverCharge; 4] = [
    mz(114.111_228),
    mz(115.108_263),
    mz(116.111_618),
    mz(117.114_973),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placement() {
        let catalog = ModificationCatalog::common();
        let ox = catalog.get("Oxidation of M").unwrap();
        assert!(ox.can_be_placed(AminoAcid::Methionine, 3, 8));
        assert!(!ox.can_be_placed(AminoAcid::Cysteine, 3, 8));
        let ac = catalog.get("Acetylation of peptide N-term").unwrap();
        assert!(ac.can_be_placed(AminoAcid::Alanine, 1, 8));
        assert!(!ac.can_be_placed(AminoAcid::Alanine, 2, 8));
    }

    #[test]
    fn read_json() {
        let json = r#"[{"name": "Custom of K", "mass": 12.5, "targets": ["Lysine"]}]"#;
        let catalog = ModificationCatalog::from_json_reader(json.as_bytes()).unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.mass("Custom of K"), Some(da(12.5)));
        assert_eq!(
            catalog.get("Custom of K").unwrap().position,
            ModificationPosition::Anywhere
        );
        assert!(ModificationCatalog::from_json_reader("{".as_bytes()).is_err());
    }
}

//! Translate the modification notation of each tool into canonical catalog names.
//!
//! Every tool writes modifications in its own way: PepNovo+ as a residue with a rounded mass
//! (`M+16`), DirecTag as a residue followed by a symbol (`M*`), pNovo+ as a lowercase letter
//! (`m`), and Novor as a residue with a name in parentheses (`M(O)`). The tables are keyed by
//! exactly these tokens, N terminal modifications use `^` as residue.

use std::{collections::BTreeMap, path::Path};

use context_error::*;
use serde::{Deserialize, Serialize};

use dncore::{
    advocate::Advocate,
    error::{DeNovoError, DeNovoErrorKind, file_context, io_error},
    modification::ModificationCatalog,
};

/// The per tool lookup tables
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct ModificationMapping {
    tables: BTreeMap<Advocate, BTreeMap<String, String>>,
}

impl Default for ModificationMapping {
    fn default() -> Self {
        let table = |entries: &[(&str, &str)]| {
            entries
                .iter()
                .map(|(token, name)| ((*token).to_string(), (*name).to_string()))
                .collect::<BTreeMap<_, _>>()
        };
        Self {
            tables: [
                (
                    Advocate::PepNovo,
                    table(&[
                        ("C+57", "Carbamidomethylation of C"),
                        ("M+16", "Oxidation of M"),
                        ("^+42", "Acetylation of peptide N-term"),
                        ("K+42", "Acetylation of K"),
                        ("N+1", "Deamidation of N"),
                        ("Q+1", "Deamidation of Q"),
                        ("Q-17", "Pyrolidone from Q"),
                        ("E-18", "Pyrolidone from E"),
                        ("S+80", "Phosphorylation of S"),
                        ("T+80", "Phosphorylation of T"),
                        ("Y+80", "Phosphorylation of Y"),
                        ("K+14", "Methylation of K"),
                        ("K+229", "TMT 6-plex of K"),
                        ("^+229", "TMT 6-plex of peptide N-term"),
                        ("K+144", "iTRAQ 4-plex of K"),
                        ("^+144", "iTRAQ 4-plex of peptide N-term"),
                    ]),
                ),
                (
                    Advocate::DirecTag,
                    table(&[
                        ("C!", "Carbamidomethylation of C"),
                        ("M*", "Oxidation of M"),
                        ("N@", "Deamidation of N"),
                        ("Q@", "Deamidation of Q"),
                        ("S#", "Phosphorylation of S"),
                        ("T#", "Phosphorylation of T"),
                        ("Y#", "Phosphorylation of Y"),
                        ("K^", "Acetylation of K"),
                    ]),
                ),
                (
                    Advocate::PNovo,
                    table(&[
                        ("c", "Carbamidomethylation of C"),
                        ("m", "Oxidation of M"),
                        ("n", "Deamidation of N"),
                        ("q", "Deamidation of Q"),
                        ("s", "Phosphorylation of S"),
                        ("t", "Phosphorylation of T"),
                        ("y", "Phosphorylation of Y"),
                        ("k", "Acetylation of K"),
                        ("1", "Acetylation of peptide N-term"),
                    ]),
                ),
                (
                    Advocate::Novor,
                    table(&[
                        ("C(Cam)", "Carbamidomethylation of C"),
                        ("M(O)", "Oxidation of M"),
                        ("N(Deamidated)", "Deamidation of N"),
                        ("Q(Deamidated)", "Deamidation of Q"),
                        ("S(Phospho)", "Phosphorylation of S"),
                        ("T(Phospho)", "Phosphorylation of T"),
                        ("Y(Phospho)", "Phosphorylation of Y"),
                        ("K(Acetyl)", "Acetylation of K"),
                        ("^(Acetyl)", "Acetylation of peptide N-term"),
                        ("Q(Pyro-glu)", "Pyrolidone from Q"),
                    ]),
                ),
            ]
            .into_iter()
            .collect(),
        }
    }
}

impl ModificationMapping {
    /// Mapping tables without any entries
    pub fn empty() -> Self {
        Self {
            tables: BTreeMap::new(),
        }
    }

    /// Read tables from a JSON object keyed by advocate, the entries are added on top of the
    /// built in tables, overwriting tokens that are defined in both.
    /// # Errors
    /// If the file cannot be read or is not a valid JSON mapping.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, DeNovoError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .map_err(|e| io_error(path, "Could not open modification mapping", &e))?;
        let custom: Self =
            serde_json::from_reader(std::io::BufReader::new(file)).map_err(|e| {
                DeNovoError::new(
                    DeNovoErrorKind::Configuration,
                    "Invalid modification mapping",
                    e.to_string(),
                    file_context(path),
                )
            })?;
        let mut mapping = Self::default();
        mapping.extend(custom);
        Ok(mapping)
    }

    /// Add all entries from the other mapping, overwriting duplicate tokens
    pub fn extend(&mut self, other: Self) {
        for (advocate, table) in other.tables {
            self.tables.entry(advocate).or_default().extend(table);
        }
    }

    /// Add or overwrite a single token
    pub fn insert(
        &mut self,
        advocate: Advocate,
        token: impl Into<String>,
        canonical: impl Into<String>,
    ) {
        self.tables
            .entry(advocate)
            .or_default()
            .insert(token.into(), canonical.into());
    }

    /// Get the canonical name for a tool specific token
    pub fn resolve(&self, advocate: Advocate, token: &str) -> Option<&str> {
        self.tables
            .get(&advocate)?
            .get(token)
            .map(String::as_str)
    }

    /// The tool specific token for a canonical name, the first in token order if there are several
    pub fn token_for(&self, advocate: Advocate, canonical: &str) -> Option<&str> {
        self.tables
            .get(&advocate)?
            .iter()
            .find(|(_, name)| name.as_str() == canonical)
            .map(|(token, _)| token.as_str())
    }

    /// Get the canonical name for a tool specific token, or an `UnmappedModification` warning
    /// naming the token
    /// # Errors
    /// If there is no entry for this token.
    pub fn resolve_or_warn(&self, advocate: Advocate, token: &str) -> Result<&str, DeNovoError> {
        self.resolve(advocate, token).ok_or_else(|| {
            DeNovoError::small(
                DeNovoErrorKind::UnmappedModification,
                format!("Unmapped {advocate} modification '{token}'"),
                format!(
                    "The modification '{token}' reported by {advocate} has no canonical counterpart, add it to the modification mapping"
                ),
            )
        })
    }

    /// Find the tokens whose canonical name is not part of the catalog
    pub fn missing_from(&self, catalog: &ModificationCatalog) -> Vec<(Advocate, &str, &str)> {
        self.tables
            .iter()
            .flat_map(|(advocate, table)| {
                table
                    .iter()
                    .map(move |(token, name)| (*advocate, token.as_str(), name.as_str()))
            })
            .filter(|(_, _, name)| !catalog.contains(name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_in_common_catalog() {
        let mapping = ModificationMapping::default();
        assert_eq!(mapping.missing_from(&ModificationCatalog::common()), Vec::new());
        assert_eq!(
            mapping.resolve(Advocate::PepNovo, "M+16"),
            Some("Oxidation of M")
        );
        assert_eq!(mapping.resolve(Advocate::Novor, "M+16"), None);
        assert_eq!(
            mapping.token_for(Advocate::DirecTag, "Oxidation of M"),
            Some("M*")
        );
        assert_eq!(mapping.token_for(Advocate::DirecTag, "Methylation of K"), None);
    }

    #[test]
    fn json_extends_defaults() {
        let custom: ModificationMapping =
            serde_json::from_str(r#"{"tables": {"PepNovo": {"M+16": "Custom oxidation"}}}"#)
                .unwrap();
        let mut mapping = ModificationMapping::default();
        mapping.extend(custom);
        assert_eq!(
            mapping.resolve(Advocate::PepNovo, "M+16"),
            Some("Custom oxidation")
        );
        assert_eq!(
            mapping.resolve(Advocate::PepNovo, "C+57"),
            Some("Carbamidomethylation of C")
        );
    }

    #[test]
    fn unmapped_warning() {
        let error = ModificationMapping::empty()
            .resolve_or_warn(Advocate::DirecTag, "W%")
            .unwrap_err();
        assert_eq!(error.get_kind(), DeNovoErrorKind::UnmappedModification);
        assert!(error.get_short_description().contains("W%"));
    }
}

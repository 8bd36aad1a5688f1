//! A protein database read from a FASTA file, searched linearly. Suitable for small databases,
//! large databases should be served by an indexed [`PeptideMapper`].

use std::{io::BufRead, path::Path, sync::Arc};

use context_error::*;
use dncore::{
    aminoacid::AminoAcid,
    error::{DeNovoError, DeNovoErrorKind},
    modification::{ModificationCatalog, ModificationPosition},
    sequence::{ModificationMatch, Tag},
    system::{Mass, sum_masses},
    tolerance::Tolerance,
};

use crate::{
    common_parser::read_lines,
    helper_functions::open_result_file,
    mapping::{PeptideMapper, PeptideProteinMapping},
};

/// A single protein
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FastaProtein {
    /// The accession, for UniProt headers (`>sp|P12345|NAME`) the middle part, otherwise the first
    /// word of the header
    pub accession: String,
    /// The rest of the header
    pub description: String,
    /// The residues
    pub sequence: Vec<AminoAcid>,
}

impl FastaProtein {
    /// Read all proteins from a (possibly gzipped) FASTA file
    /// # Errors
    /// If the file cannot be read or contains a character that is not an amino acid.
    pub fn parse_file(path: impl AsRef<Path>) -> Result<Vec<Self>, DeNovoError> {
        let path = path.as_ref();
        Self::parse_reader(open_result_file(path)?, &path.to_string_lossy())
    }

    /// Read all proteins from a reader
    /// # Errors
    /// If the reader fails or a character is not an amino acid.
    pub fn parse_reader(reader: impl BufRead, source: &str) -> Result<Vec<Self>, DeNovoError> {
        let lines = read_lines(reader, &Arc::new(source.to_string()))?;
        let mut proteins = Vec::new();
        let mut current: Option<Self> = None;
        for line in &lines {
            let text = line.text.trim();
            if let Some(header) = text.strip_prefix('>') {
                proteins.extend(current.take());
                let (identifier, description) =
                    header.split_once(' ').unwrap_or((header, ""));
                let accession = match identifier.split('|').collect::<Vec<_>>().as_slice() {
                    ["sp" | "tr", accession, ..] => (*accession).to_string(),
                    _ => identifier.to_string(),
                };
                current = Some(Self {
                    accession,
                    description: description.trim().to_string(),
                    sequence: Vec::new(),
                });
            } else if !text.is_empty() {
                let Some(protein) = current.as_mut() else {
                    return Err(line.error((
                        "Invalid FASTA file",
                        "A sequence line was found before any header line",
                    )));
                };
                for c in text.chars().filter(|c| !c.is_ascii_whitespace() && *c != '*') {
                    protein.sequence.push(AminoAcid::from_char(c).ok_or_else(|| {
                        line.error(("Invalid FASTA file", "Character is not an amino acid"))
                    })?);
                }
            }
        }
        proteins.extend(current);
        Ok(proteins)
    }
}

/// Isoleucine and leucine cannot be told apart by mass
fn same_residue(a: AminoAcid, b: AminoAcid) -> bool {
    use AminoAcid::{AmbiguousLeucine, Isoleucine, Leucine};
    a == b
        || (matches!(a, Isoleucine | Leucine | AmbiguousLeucine)
            && matches!(b, Isoleucine | Leucine | AmbiguousLeucine))
}

/// All start positions of the query in the protein
fn occurrences<'a>(
    protein: &'a [AminoAcid],
    query: &'a [AminoAcid],
) -> impl Iterator<Item = usize> + 'a {
    protein
        .windows(query.len().max(1))
        .enumerate()
        .filter(move |(_, window)| {
            !query.is_empty() && window.iter().zip(query).all(|(a, b)| same_residue(*a, *b))
        })
        .map(|(index, _)| index)
}

/// Map tags and sequences to proteins by scanning every protein
#[derive(Clone, Debug)]
pub struct FastaProteinMapper {
    proteins: Vec<FastaProtein>,
    catalog: ModificationCatalog,
    fixed_modifications: Vec<String>,
    min_indexable_length: usize,
}

impl FastaProteinMapper {
    /// Create a mapper, the fixed modifications are placed on every protein residue they fit
    pub fn new(
        proteins: Vec<FastaProtein>,
        catalog: ModificationCatalog,
        fixed_modifications: Vec<String>,
    ) -> Self {
        Self {
            proteins,
            catalog,
            fixed_modifications,
            min_indexable_length: 4,
        }
    }

    /// Set the shortest run of residues that is looked up
    #[must_use]
    pub const fn with_min_indexable_length(mut self, length: usize) -> Self {
        self.min_indexable_length = length;
        self
    }

    /// The proteins
    pub fn proteins(&self) -> &[FastaProtein] {
        &self.proteins
    }

    /// The fixed modifications that can sit on this residue anywhere in a peptide
    fn fixed_on(&self, aa: AminoAcid) -> impl Iterator<Item = (&str, Mass)> {
        self.fixed_modifications.iter().filter_map(move |name| {
            let modification = self.catalog.get(name)?;
            (modification.position == ModificationPosition::Anywhere
                && modification.targets.contains(&aa))
            .then_some((name.as_str(), modification.mass))
        })
    }

    fn residue_mass(&self, aa: AminoAcid) -> Mass {
        aa.monoisotopic_mass() + sum_masses(self.fixed_on(aa).map(|(_, mass)| mass))
    }

    /// Walk from the run outwards until the summed residue masses match the gap, returns the
    /// number of residues needed
    fn extend(
        &self,
        residues: impl Iterator<Item = AminoAcid>,
        gap: Mass,
        tolerance: Tolerance<Mass>,
    ) -> Option<usize> {
        let allowed = tolerance.absolute_at(gap);
        let mut total = Mass::default();
        let mut count = 0;
        let mut residues = residues;
        loop {
            if tolerance.within(gap, total) {
                return Some(count);
            }
            if total > gap + allowed {
                return None;
            }
            total += self.residue_mass(residues.next()?);
            count += 1;
        }
    }
}

impl PeptideMapper for FastaProteinMapper {
    fn min_indexable_length(&self) -> usize {
        self.min_indexable_length
    }

    fn map_tag(
        &self,
        tag: &Tag,
        tolerance: Tolerance<Mass>,
    ) -> Result<Vec<PeptideProteinMapping>, DeNovoError> {
        let Some(run) = tag.longest_unambiguous_run(&self.catalog) else {
            return Err(DeNovoError::new(
                DeNovoErrorKind::UnmappedModification,
                "Tag cannot be mapped",
                "The tag has no unambiguous residues or uses a modification that is not in the catalog",
                Context::show(tag.to_string()),
            ));
        };
        let mut output = Vec::new();
        for protein in &self.proteins {
            for position in occurrences(&protein.sequence, &run.sequence) {
                let end = position + run.sequence.len();
                let Some(before) = self.extend(
                    protein.sequence[..position].iter().rev().copied(),
                    run.n_terminal_mass,
                    tolerance,
                ) else {
                    continue;
                };
                let Some(after) = self.extend(
                    protein.sequence[end..].iter().copied(),
                    run.c_terminal_mass,
                    tolerance,
                ) else {
                    continue;
                };
                let start = position - before;
                let sequence = protein.sequence[start..end + after].to_vec();
                let mut modifications = run
                    .modifications
                    .iter()
                    .map(|m| ModificationMatch {
                        site: m.site + before,
                        ..m.clone()
                    })
                    .collect::<Vec<_>>();
                for (index, aa) in sequence.iter().enumerate() {
                    if (before..before + run.sequence.len()).contains(&index) {
                        continue;
                    }
                    modifications.extend(
                        self.fixed_on(*aa)
                            .map(|(name, _)| ModificationMatch::fixed(index + 1, name)),
                    );
                }
                output.push(PeptideProteinMapping {
                    accession: protein.accession.clone(),
                    peptide_sequence: sequence,
                    index: start,
                    modifications,
                });
            }
        }
        Ok(output)
    }

    fn map_sequence(
        &self,
        sequence: &[AminoAcid],
    ) -> Result<Vec<PeptideProteinMapping>, DeNovoError> {
        Ok(self
            .proteins
            .iter()
            .flat_map(|protein| {
                occurrences(&protein.sequence, sequence).map(|index| PeptideProteinMapping {
                    accession: protein.accession.clone(),
                    peptide_sequence: protein.sequence[index..index + sequence.len()].to_vec(),
                    index,
                    modifications: Vec::new(),
                })
            })
            .collect())
    }
}

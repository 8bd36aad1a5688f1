//! Peptides and tags, the two kinds of sequence hypotheses reported by de novo tools.

use std::{
    fmt::{Display, Write},
    ops::Range,
};

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{
    aminoacid::{AminoAcid, WATER, sequence_to_string},
    modification::{ModificationCatalog, ModificationPosition},
    system::{Mass, sum_masses},
};

/// A modification placed on a sequence
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct ModificationMatch {
    /// The one based index of the modified residue, terminal modifications are placed on the
    /// first or last residue
    pub site: usize,
    /// The canonical modification name
    pub modification_name: String,
    /// If this is a variable modification (as opposed to fixed)
    pub is_variable: bool,
    /// If the localisation of this modification is confident
    pub is_confident: bool,
}

impl ModificationMatch {
    /// A variable modification with confident localisation
    pub fn variable(site: usize, modification_name: impl Into<String>) -> Self {
        Self {
            site,
            modification_name: modification_name.into(),
            is_variable: true,
            is_confident: true,
        }
    }

    /// A fixed modification
    pub fn fixed(site: usize, modification_name: impl Into<String>) -> Self {
        Self {
            site,
            modification_name: modification_name.into(),
            is_variable: false,
            is_confident: true,
        }
    }
}

/// Sum the residue and modification masses per position, `None` if a modification is not known.
fn residue_masses(
    sequence: &[AminoAcid],
    modifications: &[ModificationMatch],
    catalog: &ModificationCatalog,
) -> Option<Vec<Mass>> {
    let mut masses = sequence
        .iter()
        .map(|aa| aa.monoisotopic_mass())
        .collect_vec();
    for modification in modifications {
        let index = modification.site.checked_sub(1)?;
        *masses.get_mut(index)? += catalog.mass(&modification.modification_name)?;
    }
    Some(masses)
}

/// Write the modifications placed on the given site as `[Oxidation of M]`, fixed modifications
/// are left out unless asked for
fn write_site_modifications(
    f: &mut impl Write,
    modifications: &[ModificationMatch],
    site: usize,
    include_fixed: bool,
) -> std::fmt::Result {
    for modification in modifications
        .iter()
        .filter(|m| m.site == site && (include_fixed || m.is_variable))
    {
        write!(f, "[{}]", modification.modification_name)?;
    }
    Ok(())
}

/// Write a sequence with modifications as `PEPM[Oxidation of M]K`
fn write_modified(
    f: &mut impl Write,
    sequence: &[AminoAcid],
    modifications: &[ModificationMatch],
    include_fixed: bool,
) -> std::fmt::Result {
    for (index, aa) in sequence.iter().enumerate() {
        write!(f, "{aa}")?;
        write_site_modifications(f, modifications, index + 1, include_fixed)?;
    }
    Ok(())
}

/// A fully resolved amino acid sequence with its modifications
#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Peptide {
    sequence: Vec<AminoAcid>,
    modifications: Vec<ModificationMatch>,
    parent_proteins: Vec<String>,
}

impl Peptide {
    /// Create a new peptide, the modifications are sorted by site
    pub fn new(sequence: Vec<AminoAcid>, mut modifications: Vec<ModificationMatch>) -> Self {
        modifications.sort();
        Self {
            sequence,
            modifications,
            parent_proteins: Vec::new(),
        }
    }

    /// The amino acids
    pub fn sequence(&self) -> &[AminoAcid] {
        &self.sequence
    }

    /// The unmodified sequence as one letter codes
    pub fn sequence_string(&self) -> String {
        sequence_to_string(&self.sequence)
    }

    /// The number of residues
    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    /// If there are no residues
    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    /// The modifications, sorted by site
    pub fn modifications(&self) -> &[ModificationMatch] {
        &self.modifications
    }

    /// Add a modification unless the exact same one is already present
    pub fn add_modification(&mut self, modification: ModificationMatch) {
        if let Err(index) = self.modifications.binary_search(&modification) {
            self.modifications.insert(index, modification);
        }
    }

    /// The accessions of the proteins this peptide was mapped to, sorted and unique
    pub fn parent_proteins(&self) -> &[String] {
        &self.parent_proteins
    }

    /// Add parent proteins, keeps the list sorted and without duplicates
    pub fn add_parent_proteins(&mut self, accessions: impl IntoIterator<Item = String>) {
        self.parent_proteins.extend(accessions);
        self.parent_proteins.sort();
        self.parent_proteins.dedup();
    }

    /// The mass of every residue including its modifications, `None` if any modification is not
    /// in the catalog
    pub fn residue_masses(&self, catalog: &ModificationCatalog) -> Option<Vec<Mass>> {
        residue_masses(&self.sequence, &self.modifications, catalog)
    }

    /// The positions of this peptide for fragment ladders, `None` if any modification is not in
    /// the catalog
    pub fn ladder(&self, catalog: &ModificationCatalog) -> Option<Vec<LadderPosition>> {
        let masses = self.residue_masses(catalog)?;
        Some(
            self.sequence
                .iter()
                .zip(masses)
                .enumerate()
                .map(|(index, (aa, mass))| LadderPosition {
                    residue: Some(*aa),
                    mass,
                    modifications: self
                        .modifications
                        .iter()
                        .filter(|m| m.site == index + 1)
                        .map(|m| m.modification_name.clone())
                        .collect(),
                })
                .collect(),
        )
    }

    /// The neutral monoisotopic mass, `None` if any modification is not in the catalog
    pub fn monoisotopic_mass(&self, catalog: &ModificationCatalog) -> Option<Mass> {
        self.residue_masses(catalog)
            .map(|masses| sum_masses(masses) + WATER)
    }

    /// The sequence with the modifications in brackets after the residue
    pub fn modified_sequence(&self) -> String {
        self.to_string()
    }

    /// The sequence with only the variable modifications in brackets, fixed modifications are
    /// implied by the search parameters
    pub fn variable_modified_sequence(&self) -> String {
        let mut output = String::new();
        // Writing to a String cannot fail
        let _ = write_modified(&mut output, &self.sequence, &self.modifications, false);
        output
    }
}

impl Display for Peptide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write_modified(f, &self.sequence, &self.modifications, true)
    }
}

/// A stretch of residues where every position can hold one or more amino acids
#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct AminoAcidPattern {
    /// The options per position
    pub residues: Vec<Vec<AminoAcid>>,
    /// The modifications with sites relative to this pattern
    pub modifications: Vec<ModificationMatch>,
}

impl AminoAcidPattern {
    /// A pattern with exactly one option per position
    pub fn from_sequence(sequence: &[AminoAcid], modifications: Vec<ModificationMatch>) -> Self {
        Self {
            residues: sequence.iter().map(|aa| vec![*aa]).collect(),
            modifications,
        }
    }

    /// Check if the position holds exactly one amino acid which is not itself ambiguous
    fn is_unambiguous(&self, index: usize) -> bool {
        matches!(self.residues.get(index).map(Vec::as_slice), Some([aa]) if !aa.is_ambiguous())
    }

    /// The first option of every position
    pub fn representative(&self) -> Vec<AminoAcid> {
        self.residues
            .iter()
            .map(|options| options.first().copied().unwrap_or(AminoAcid::Unknown))
            .collect()
    }
}

/// A stretch of known residues
#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct AminoAcidSequence {
    /// The residues
    pub sequence: Vec<AminoAcid>,
    /// The modifications with sites relative to this sequence
    pub modifications: Vec<ModificationMatch>,
}

/// One element of a tag
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum TagComponent {
    /// Residues with possibly multiple options per position
    AminoAcidPattern(AminoAcidPattern),
    /// Known residues
    AminoAcidSequence(AminoAcidSequence),
    /// A stretch of unknown residues of which only the mass is known
    MassGap(Mass),
}

impl TagComponent {
    /// The number of residues, zero for mass gaps
    pub fn len(&self) -> usize {
        match self {
            Self::AminoAcidPattern(p) => p.residues.len(),
            Self::AminoAcidSequence(s) => s.sequence.len(),
            Self::MassGap(_) => 0,
        }
    }

    /// If this component contains no residues
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The residues of this component, using the first option for patterns
    fn residues(&self) -> Vec<AminoAcid> {
        match self {
            Self::AminoAcidPattern(p) => p.representative(),
            Self::AminoAcidSequence(s) => s.sequence.clone(),
            Self::MassGap(_) => Vec::new(),
        }
    }

    fn modifications(&self) -> &[ModificationMatch] {
        match self {
            Self::AminoAcidPattern(p) => &p.modifications,
            Self::AminoAcidSequence(s) => &s.modifications,
            Self::MassGap(_) => &[],
        }
    }

    fn modifications_mut(&mut self) -> Option<&mut Vec<ModificationMatch>> {
        match self {
            Self::AminoAcidPattern(p) => Some(&mut p.modifications),
            Self::AminoAcidSequence(s) => Some(&mut s.modifications),
            Self::MassGap(_) => None,
        }
    }

    fn is_unambiguous(&self, index: usize) -> bool {
        match self {
            Self::AminoAcidPattern(p) => p.is_unambiguous(index),
            Self::AminoAcidSequence(s) => s.sequence.get(index).is_some_and(|aa| !aa.is_ambiguous()),
            Self::MassGap(_) => false,
        }
    }

    /// The mass of this component, `None` if a modification is not in the catalog
    pub fn mass(&self, catalog: &ModificationCatalog) -> Option<Mass> {
        match self {
            Self::MassGap(mass) => Some(*mass),
            _ => residue_masses(&self.residues(), self.modifications(), catalog).map(sum_masses),
        }
    }
}

/// A contiguous run of residues within a tag, with the masses on either side
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TagRun {
    /// The residues of the run
    pub sequence: Vec<AminoAcid>,
    /// The modifications with sites relative to the run
    pub modifications: Vec<ModificationMatch>,
    /// The summed mass of everything N terminal of the run
    pub n_terminal_mass: Mass,
    /// The summed mass of everything C terminal of the run
    pub c_terminal_mass: Mass,
}

impl TagRun {
    /// The run as one letter codes
    pub fn sequence_string(&self) -> String {
        sequence_to_string(&self.sequence)
    }
}

/// One position along a sequence as seen by a fragment ladder: a residue with its modifications
/// or a mass gap of unknown residues
#[derive(Clone, Debug, PartialEq)]
pub struct LadderPosition {
    /// The residue, `None` for a mass gap
    pub residue: Option<AminoAcid>,
    /// The mass of this position, modifications included
    pub mass: Mass,
    /// The canonical names of the modifications on this residue
    pub modifications: Vec<String>,
}

/// A partial sequence hypothesis, residues flanked by mass gaps
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Tag {
    components: Vec<TagComponent>,
}

impl Tag {
    /// Create a tag from its components
    pub const fn new(components: Vec<TagComponent>) -> Self {
        Self { components }
    }

    /// The most common tag layout: N terminal gap, residues, C terminal gap
    pub fn from_gapped_sequence(
        n_gap: Mass,
        sequence: &[AminoAcid],
        modifications: Vec<ModificationMatch>,
        c_gap: Mass,
    ) -> Self {
        Self::new(vec![
            TagComponent::MassGap(n_gap),
            TagComponent::AminoAcidPattern(AminoAcidPattern::from_sequence(
                sequence,
                modifications,
            )),
            TagComponent::MassGap(c_gap),
        ])
    }

    /// The components
    pub fn components(&self) -> &[TagComponent] {
        &self.components
    }

    /// The mass of the leading gap, zero if the tag starts with residues
    pub fn n_terminal_gap(&self) -> Mass {
        match self.components.first() {
            Some(TagComponent::MassGap(mass)) => *mass,
            _ => Mass::default(),
        }
    }

    /// The mass of the trailing gap, zero if the tag ends with residues
    pub fn c_terminal_gap(&self) -> Mass {
        match self.components.last() {
            Some(TagComponent::MassGap(mass)) if self.components.len() > 1 => *mass,
            _ => Mass::default(),
        }
    }

    /// Add a modification to every residue of the tag it can be placed on, used for fixed
    /// modifications. Terminal modifications only land on residues at the very ends of the tag.
    pub fn add_fixed_modification(&mut self, name: &str, catalog: &ModificationCatalog) {
        let Some(modification) = catalog.get(name) else {
            return;
        };
        let total = self.components.len();
        for (component_index, component) in self.components.iter_mut().enumerate() {
            let residues = component.residues();
            let length = residues.len();
            let mut new = Vec::new();
            for (index, aa) in residues.iter().enumerate() {
                let site = index + 1;
                let placeable = match modification.position {
                    ModificationPosition::Anywhere => true,
                    ModificationPosition::NTerminal => {
                        component_index == 0 && site == 1
                    }
                    ModificationPosition::CTerminal => {
                        component_index + 1 == total && site == length
                    }
                };
                if placeable
                    && (modification.targets.is_empty() || modification.targets.contains(aa))
                {
                    new.push(ModificationMatch::fixed(site, name));
                }
            }
            if let Some(existing) = component.modifications_mut() {
                for m in new {
                    if !existing.contains(&m) {
                        existing.push(m);
                    }
                }
                existing.sort();
            }
        }
    }

    /// The length of the longest contiguous run of residues, ambiguous residues included
    pub fn longest_amino_acid_run_length(&self) -> usize {
        self.runs(false).map(|range| range.len()).max().unwrap_or(0)
    }

    /// The length of the longest contiguous run of unambiguous residues
    pub fn longest_unambiguous_run_length(&self) -> usize {
        self.runs(true).map(|range| range.len()).max().unwrap_or(0)
    }

    /// The longest contiguous run of residues as one letter codes (ambiguous residues included),
    /// the first run wins on ties
    pub fn longest_amino_acid_sequence(&self) -> String {
        let flat = self.flatten();
        self.runs(false)
            .fold(None::<Range<usize>>, |best, range| match best {
                Some(b) if b.len() >= range.len() => Some(b),
                _ => Some(range),
            })
            .map(|range| {
                flat[range]
                    .iter()
                    .filter_map(|(aa, _)| aa.map(|a| a.char()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The longest run of unambiguous residues with the masses on either side, `None` if the tag
    /// has no unambiguous residues or contains a modification not in the catalog
    pub fn longest_unambiguous_run(&self, catalog: &ModificationCatalog) -> Option<TagRun> {
        let flat = self.flatten();
        let range = self
            .runs(true)
            .fold(None::<Range<usize>>, |best, range| match best {
                Some(b) if b.len() >= range.len() => Some(b),
                _ => Some(range),
            })?;
        let masses = flat
            .iter()
            .map(|(_, mass)| mass.resolve(catalog))
            .collect::<Option<Vec<Mass>>>()?;
        let mut modifications = Vec::new();
        for (offset, index) in range.clone().enumerate() {
            if let FlatMass::Residue(_, mods) = &flat[index].1 {
                modifications.extend(mods.iter().map(|m| ModificationMatch {
                    site: offset + 1,
                    ..m.clone()
                }));
            }
        }
        Some(TagRun {
            sequence: flat[range.clone()].iter().filter_map(|(aa, _)| *aa).collect(),
            modifications,
            n_terminal_mass: sum_masses(masses[..range.start].iter().copied()),
            c_terminal_mass: sum_masses(masses[range.end..].iter().copied()),
        })
    }

    /// The positions of this tag for fragment ladders, gaps become single positions, `None` if a
    /// modification is not in the catalog
    pub fn ladder(&self, catalog: &ModificationCatalog) -> Option<Vec<LadderPosition>> {
        self.flatten()
            .into_iter()
            .map(|(residue, flat)| {
                let mass = flat.resolve(catalog)?;
                let modifications = match flat {
                    FlatMass::Residue(_, mods) => {
                        mods.into_iter().map(|m| m.modification_name).collect()
                    }
                    FlatMass::Gap(_) => Vec::new(),
                };
                Some(LadderPosition {
                    residue,
                    mass,
                    modifications,
                })
            })
            .collect()
    }

    /// The total mass of the tag, `None` if a modification is not in the catalog
    pub fn mass(&self, catalog: &ModificationCatalog) -> Option<Mass> {
        self.components
            .iter()
            .try_fold(Mass::default(), |total, c| Some(total + c.mass(catalog)?))
    }

    /// The tag with only the variable modifications in brackets, fixed modifications are implied
    /// by the search parameters
    pub fn variable_modified_sequence(&self) -> String {
        let mut output = String::new();
        // Writing to a String cannot fail
        let _ = self.write_components(&mut output, false);
        output
    }

    fn write_components(&self, f: &mut impl Write, include_fixed: bool) -> std::fmt::Result {
        for component in &self.components {
            match component {
                TagComponent::MassGap(mass) if mass.value != 0.0 => {
                    write!(f, "<{:.3}>", mass.value)?;
                }
                TagComponent::MassGap(_) => (),
                TagComponent::AminoAcidSequence(s) => {
                    write_modified(f, &s.sequence, &s.modifications, include_fixed)?;
                }
                TagComponent::AminoAcidPattern(p) => {
                    for (index, options) in p.residues.iter().enumerate() {
                        if options.len() == 1 {
                            write!(f, "{}", options[0])?;
                        } else {
                            write!(f, "[{}]", options.iter().join(""))?;
                        }
                        write_site_modifications(f, &p.modifications, index + 1, include_fixed)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Flatten the tag into positions: residues (with their modifications) and mass gaps
    fn flatten(&self) -> Vec<(Option<AminoAcid>, FlatMass)> {
        let mut output = Vec::new();
        for component in &self.components {
            match component {
                TagComponent::MassGap(mass) => output.push((None, FlatMass::Gap(*mass))),
                _ => {
                    for (index, aa) in component.residues().into_iter().enumerate() {
                        let mods = component
                            .modifications()
                            .iter()
                            .filter(|m| m.site == index + 1)
                            .cloned()
                            .collect();
                        output.push((Some(aa), FlatMass::Residue(aa, mods)));
                    }
                }
            }
        }
        output
    }

    /// Find all maximal runs of residues in the flattened tag, optionally only unambiguous residues
    fn runs(&self, unambiguous: bool) -> impl Iterator<Item = Range<usize>> {
        let mut flags = Vec::new();
        for component in &self.components {
            for index in 0..component.len() {
                flags.push(!unambiguous || component.is_unambiguous(index));
            }
            if matches!(component, TagComponent::MassGap(_)) {
                flags.push(false);
            }
        }
        let mut runs = Vec::new();
        let mut start = None;
        for (index, flag) in flags.iter().copied().chain(std::iter::once(false)).enumerate() {
            match (flag, start) {
                (true, None) => start = Some(index),
                (false, Some(s)) => {
                    runs.push(s..index);
                    start = None;
                }
                _ => (),
            }
        }
        runs.into_iter()
    }
}

#[derive(Clone, Debug)]
enum FlatMass {
    Gap(Mass),
    Residue(AminoAcid, Vec<ModificationMatch>),
}

impl FlatMass {
    fn resolve(&self, catalog: &ModificationCatalog) -> Option<Mass> {
        match self {
            Self::Gap(mass) => Some(*mass),
            Self::Residue(aa, mods) => mods.iter().try_fold(aa.monoisotopic_mass(), |acc, m| {
                catalog.mass(&m.modification_name).map(|mass| acc + mass)
            }),
        }
    }
}

impl Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.write_components(f, true)
    }
}

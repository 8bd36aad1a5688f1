//! Theoretical fragments of tags and peptides.

use std::fmt::Display;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thin_vec::ThinVec;

use dncore::{
    aminoacid::{AMMONIA, AminoAcid, CARBON_MONOXIDE, HYDROGEN, PROTON, WATER},
    modification::ModificationCatalog,
    sequence::LadderPosition,
    system::{Mass, MassOverCharge, charge, sum_masses},
};

/// The kinds of ions that can be annotated, each can be switched on or off on its own
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
pub enum IonType {
    /// N terminal a ions
    A,
    /// N terminal b ions
    B,
    /// N terminal c ions
    C,
    /// C terminal x ions
    X,
    /// C terminal y ions
    Y,
    /// C terminal z (z dot) ions
    Z,
    /// The intact precursor
    Precursor,
    /// Single residue immonium ions
    Immonium,
    /// Immonium ions that lost water or ammonia
    Related,
    /// Reporter ions of labelling modifications
    Reporter,
}

impl IonType {
    /// All ion types
    pub const ALL: [Self; 10] = [
        Self::A,
        Self::B,
        Self::C,
        Self::X,
        Self::Y,
        Self::Z,
        Self::Precursor,
        Self::Immonium,
        Self::Related,
        Self::Reporter,
    ];

    /// If this ion contains the N terminus of the sequence
    pub const fn is_n_terminal(self) -> bool {
        matches!(self, Self::A | Self::B | Self::C)
    }

    /// If this ion contains the C terminus of the sequence
    pub const fn is_c_terminal(self) -> bool {
        matches!(self, Self::X | Self::Y | Self::Z)
    }

    /// The mass difference between the summed residues of a ladder ion and its neutral mass
    fn ladder_offset(self) -> Mass {
        match self {
            Self::A => -CARBON_MONOXIDE,
            Self::C => AMMONIA,
            Self::X => WATER + CARBON_MONOXIDE - HYDROGEN * 2.0,
            Self::Y => WATER,
            Self::Z => WATER - AMMONIA + HYDROGEN,
            _ => Mass::default(),
        }
    }
}

impl Display for IonType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::A => "a",
                Self::B => "b",
                Self::C => "c",
                Self::X => "x",
                Self::Y => "y",
                Self::Z => "z",
                Self::Precursor => "precursor",
                Self::Immonium => "immonium",
                Self::Related => "related",
                Self::Reporter => "reporter",
            }
        )
    }
}

/// A neutral loss from a fragment
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum NeutralLoss {
    /// Loss of water
    Water,
    /// Loss of ammonia
    Ammonia,
    /// A loss specific to a modification
    Modification {
        /// The canonical modification name
        name: String,
        /// The lost mass
        mass: Mass,
    },
}

impl NeutralLoss {
    /// The lost mass
    pub const fn mass(&self) -> Mass {
        match self {
            Self::Water => WATER,
            Self::Ammonia => AMMONIA,
            Self::Modification { mass, .. } => *mass,
        }
    }
}

impl Display for NeutralLoss {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Water => write!(f, "H2O"),
            Self::Ammonia => write!(f, "NH3"),
            Self::Modification { mass, .. } => write!(f, "{:.3}", mass.value),
        }
    }
}

/// What a theoretical fragment is
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum FragmentType {
    /// A ladder ion (a/b/c/x/y/z) with the number of residues it contains
    Ladder(IonType, usize),
    /// The intact precursor
    Precursor,
    /// An immonium ion of a residue
    Immonium(AminoAcid),
    /// A related ion of a residue
    Related(AminoAcid),
    /// A reporter ion at the given m/z
    Reporter(MassOverCharge),
}

impl FragmentType {
    /// The ion type of this fragment
    pub const fn ion_type(&self) -> IonType {
        match self {
            Self::Ladder(ion, _) => *ion,
            Self::Precursor => IonType::Precursor,
            Self::Immonium(_) => IonType::Immonium,
            Self::Related(_) => IonType::Related,
            Self::Reporter(_) => IonType::Reporter,
        }
    }
}

impl Display for FragmentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ladder(ion, number) => write!(f, "{ion}{number}"),
            Self::Precursor => write!(f, "p"),
            Self::Immonium(aa) => write!(f, "i{aa}"),
            Self::Related(aa) => write!(f, "r{aa}"),
            Self::Reporter(mz) => write!(f, "rep{:.2}", mz.value),
        }
    }
}

/// A theoretical fragment
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Fragment {
    /// What kind of fragment this is
    pub ion: FragmentType,
    /// The charge
    pub charge: usize,
    /// Any neutral losses applied
    pub neutral_losses: ThinVec<NeutralLoss>,
    /// The theoretical m/z
    pub mz: MassOverCharge,
}

impl Fragment {
    /// Create a fragment from its neutral mass
    pub fn new(
        ion: FragmentType,
        neutral_mass: Mass,
        z: usize,
        neutral_losses: ThinVec<NeutralLoss>,
    ) -> Self {
        let z = z.max(1);
        let lost = sum_masses(neutral_losses.iter().map(NeutralLoss::mass));
        Self {
            ion,
            charge: z,
            mz: (neutral_mass - lost + PROTON * z as f64) / charge(z),
            neutral_losses,
        }
    }
}

impl Display for Fragment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.ion)?;
        if self.charge > 1 {
            write!(f, "{}", "+".repeat(self.charge))?;
        }
        for loss in &self.neutral_losses {
            write!(f, "-{loss}")?;
        }
        Ok(())
    }
}

/// Which neutral losses are considered
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum NeutralLossPolicy {
    /// No neutral losses
    None,
    /// Water, ammonia, and the modification specific losses on every fragment
    All,
    /// Only losses possible for the residues and modifications within the fragment
    #[default]
    SequenceDependent,
}

/// Generate the fragments of a sequence given as its ladder positions.
///
/// Ladder ions are generated at every cut between two positions. Their number is the count of
/// residues they contain, cuts leaving only a mass gap on one side do not give that side's
/// ions. Charges above `max_charge` are skipped, except that singly charged ions are always
/// generated. Immonium, related, and reporter ions are singly charged.
pub fn generate_fragments(
    ladder: &[LadderPosition],
    ion_types: &[IonType],
    charges: &[usize],
    max_charge: usize,
    policy: NeutralLossPolicy,
    catalog: &ModificationCatalog,
) -> Vec<Fragment> {
    let ladder = ladder
        .iter()
        .filter(|p| p.residue.is_some() || p.mass.value != 0.0)
        .collect_vec();
    let charges = charges
        .iter()
        .copied()
        .filter(|c| *c >= 1 && (*c == 1 || *c <= max_charge))
        .sorted()
        .dedup()
        .collect_vec();
    let enabled = |ion: IonType| ion_types.contains(&ion);
    let mut fragments = Vec::new();

    for cut in 1..ladder.len() {
        let (prefix, suffix) = ladder.split_at(cut);
        for (ion, part) in [
            (IonType::A, prefix),
            (IonType::B, prefix),
            (IonType::C, prefix),
            (IonType::X, suffix),
            (IonType::Y, suffix),
            (IonType::Z, suffix),
        ] {
            let residues = part.iter().filter(|p| p.residue.is_some()).count();
            if !enabled(ion) || residues == 0 {
                continue;
            }
            let mass = sum_masses(part.iter().map(|p| p.mass)) + ion.ladder_offset();
            let losses = neutral_losses(part, &ladder, policy, catalog);
            for z in &charges {
                for loss in std::iter::once(None).chain(losses.iter().map(Some)) {
                    fragments.push(Fragment::new(
                        FragmentType::Ladder(ion, residues),
                        mass,
                        *z,
                        loss.cloned().into_iter().collect(),
                    ));
                }
            }
        }
    }

    if enabled(IonType::Precursor) && !ladder.is_empty() {
        let mass = sum_masses(ladder.iter().map(|p| p.mass)) + WATER;
        let losses = neutral_losses(&ladder, &ladder, policy, catalog);
        for z in 1..=max_charge.max(1) {
            for loss in std::iter::once(None).chain(losses.iter().map(Some)) {
                fragments.push(Fragment::new(
                    FragmentType::Precursor,
                    mass,
                    z,
                    loss.cloned().into_iter().collect(),
                ));
            }
        }
    }

    let residues = ladder
        .iter()
        .filter(|p| p.modifications.is_empty())
        .filter_map(|p| p.residue)
        .filter(|aa| !aa.is_ambiguous())
        .sorted()
        .dedup()
        .collect_vec();
    if enabled(IonType::Immonium) {
        fragments.extend(residues.iter().map(|aa| {
            Fragment::new(
                FragmentType::Immonium(*aa),
                aa.immonium_mz() * charge(1) - PROTON,
                1,
                ThinVec::new(),
            )
        }));
    }
    if enabled(IonType::Related) {
        for aa in &residues {
            let loss = if aa.can_lose_ammonia() {
                NeutralLoss::Ammonia
            } else if aa.can_lose_water() {
                NeutralLoss::Water
            } else {
                continue;
            };
            fragments.push(Fragment::new(
                FragmentType::Related(*aa),
                aa.immonium_mz() * charge(1) - PROTON,
                1,
                std::iter::once(loss).collect(),
            ));
        }
    }
    if enabled(IonType::Reporter) {
        let reporters = ladder
            .iter()
            .flat_map(|p| &p.modifications)
            .filter_map(|name| catalog.get(name))
            .flat_map(|m| m.reporter_ions.iter().copied())
            .sorted_by(|a, b| a.value.total_cmp(&b.value))
            .dedup();
        fragments.extend(reporters.map(|mz| {
            Fragment::new(
                FragmentType::Reporter(mz),
                mz * charge(1) - PROTON,
                1,
                ThinVec::new(),
            )
        }));
    }
    fragments
}

/// The single neutral losses possible for a part of a sequence, with [`NeutralLossPolicy::All`]
/// the modification losses of the whole sequence apply to every part
fn neutral_losses(
    part: &[&LadderPosition],
    whole: &[&LadderPosition],
    policy: NeutralLossPolicy,
    catalog: &ModificationCatalog,
) -> Vec<NeutralLoss> {
    let all = match policy {
        NeutralLossPolicy::None => return Vec::new(),
        NeutralLossPolicy::All => true,
        NeutralLossPolicy::SequenceDependent => false,
    };
    let mut losses = Vec::new();
    if all || part.iter().any(|p| p.residue.is_some_and(AminoAcid::can_lose_water)) {
        losses.push(NeutralLoss::Water);
    }
    if all || part.iter().any(|p| p.residue.is_some_and(AminoAcid::can_lose_ammonia)) {
        losses.push(NeutralLoss::Ammonia);
    }
    let source = if all { whole } else { part };
    for name in source.iter().flat_map(|p| &p.modifications).sorted().dedup() {
        if let Some(modification) = catalog.get(name) {
            losses.extend(modification.neutral_losses.iter().map(|mass| {
                NeutralLoss::Modification {
                    name: name.clone(),
                    mass: *mass,
                }
            }));
        }
    }
    losses
}

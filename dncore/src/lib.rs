#![doc = include_str!("../README.md")]
#![expect(macro_use_extern_crate)] // Could not get uom to work without

pub mod advocate;
pub mod aminoacid;
/// The shared error type, see [`DeNovoError`](error::DeNovoError).
pub mod error;
pub mod modification;
/// Search parameters, loaded from and saved to JSON.
pub mod parameters;
pub mod sequence;
pub mod space;
pub mod spectrum;
pub mod system;
pub mod tolerance;

/// A subset of the types and traits that are envisioned to be used the most, importing this is a good starting point for working with the crate
pub mod prelude {
    pub use crate::advocate::Advocate;
    pub use crate::aminoacid::AminoAcid;
    pub use crate::error::{DeNovoError, DeNovoErrorKind};
    pub use crate::modification::{Modification, ModificationCatalog, ModificationPosition};
    pub use crate::parameters::SearchParameters;
    pub use crate::sequence::{ModificationMatch, Peptide, Tag, TagComponent};
    pub use crate::space::{Space, UsedSpace};
    pub use crate::spectrum::{Peak, Precursor, Spectrum, SpectrumIdentifier, SpectrumProvider};
    pub use crate::system::{Mass, MassOverCharge, Ratio};
    pub use crate::tolerance::Tolerance;
}

#[macro_use]
extern crate uom;

#![doc = include_str!("../README.md")]

pub mod annotation;
pub mod fragment;

/// A subset of the types and traits that are envisioned to be used the most, importing this is a good starting point for working with the crate
pub mod prelude {
    pub use crate::annotation::{
        AnnotationSettings, IonMatch, TieBreaker, annotate, explained_intensity,
    };
    pub use crate::fragment::{
        Fragment, FragmentType, IonType, NeutralLoss, NeutralLossPolicy, generate_fragments,
    };
}

#![doc = include_str!("../README.md")]

pub mod assumption;
mod common_parser;
pub mod export;
pub mod fasta;
/// Readers for the result files of every supported tool.
pub mod formats;
mod helper_functions;
pub mod import;
pub mod mapping;
pub mod mgf;
pub mod modification_mapping;
pub mod ranking;
pub mod session;
pub mod spectrum_match;
pub mod statistics;
pub mod store;
pub mod task;
pub mod tools;

/// A subset of the types and traits that are envisioned to be used the most, importing this is a good starting point for working with the crate
pub mod prelude {
    pub use crate::assumption::{AssumptionData, ResultAssumption};
    pub use crate::export::{ExportSettings, ExportType, export, export_to_file};
    pub use crate::fasta::{FastaProtein, FastaProteinMapper};
    pub use crate::formats::{ReaderRegistry, ResultFileReader};
    pub use crate::import::{ImportOutcome, Importer, import_results};
    pub use crate::mapping::{MappingOutcome, MappingSettings, PeptideMapper, map_to_proteins};
    pub use crate::mgf::{load_mgf, parse_mgf_file};
    pub use crate::modification_mapping::ModificationMapping;
    pub use crate::ranking::{best_score, order_titles_by_score, sort_scores};
    pub use crate::session::SessionContext;
    pub use crate::spectrum_match::{AssumptionMap, SpectrumMatch};
    pub use crate::store::{CacheSettings, IdentificationSnapshot, IdentificationStore};
    pub use crate::task::{OperationLock, OperationState, Progress, TaskOutcome, spawn_task};
    pub use crate::tools::{ToolRun, ToolRunner};
}

//! The search parameters shared by all sequencing tools of a session.

use std::path::Path;

use context_error::*;
use serde::{Deserialize, Serialize};

use crate::{
    error::{DeNovoError, DeNovoErrorKind, file_context, io_error},
    modification::ModificationCatalog,
    system::{Mass, da},
    tolerance::Tolerance,
};

/// Parameters for a de novo search, immutable once a session has started
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct SearchParameters {
    /// The tolerance used to match fragments
    pub fragment_tolerance: Tolerance,
    /// The tolerance used to match precursors
    pub precursor_tolerance: Tolerance,
    /// Names of fixed modifications, as found in the session catalog
    pub fixed_modifications: Vec<String>,
    /// Names of variable modifications, as found in the session catalog
    pub variable_modifications: Vec<String>,
    /// The lowest precursor charge considered
    pub min_charge: usize,
    /// The highest precursor charge considered
    pub max_charge: usize,
    /// The number of solutions requested from every tool per spectrum
    pub number_of_solutions: usize,
    /// PepNovo+ specific settings
    pub pepnovo: PepNovoParameters,
    /// DirecTag specific settings
    pub directag: DirecTagParameters,
    /// pNovo+ specific settings
    pub pnovo: PNovoParameters,
    /// Novor specific settings
    pub novor: NovorParameters,
}

impl Default for SearchParameters {
    fn default() -> Self {
        Self {
            fragment_tolerance: Tolerance::new_absolute(0.5),
            precursor_tolerance: Tolerance::new_absolute(1.0),
            fixed_modifications: vec!["Carbamidomethylation of C".to_string()],
            variable_modifications: vec!["Oxidation of M".to_string()],
            min_charge: 2,
            max_charge: 4,
            number_of_solutions: 10,
            pepnovo: PepNovoParameters::default(),
            directag: DirecTagParameters::default(),
            pnovo: PNovoParameters::default(),
            novor: NovorParameters::default(),
        }
    }
}

impl SearchParameters {
    /// Read parameters from a JSON file, missing fields get their default value
    /// # Errors
    /// If the file could not be read or is not valid JSON for these parameters.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, DeNovoError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .map_err(|e| io_error(path, "Could not open search parameters", &e))?;
        serde_json::from_reader(std::io::BufReader::new(file)).map_err(|e| {
            DeNovoError::new(
                DeNovoErrorKind::Configuration,
                "Invalid search parameters",
                e.to_string(),
                file_context(path),
            )
        })
    }

    /// Write the parameters as pretty printed JSON
    /// # Errors
    /// If the file could not be created or written.
    pub fn to_json_file(&self, path: impl AsRef<Path>) -> Result<(), DeNovoError> {
        let path = path.as_ref();
        let file = std::fs::File::create(path)
            .map_err(|e| io_error(path, "Could not create search parameters file", &e))?;
        serde_json::to_writer_pretty(std::io::BufWriter::new(file), self).map_err(|e| {
            DeNovoError::new(
                DeNovoErrorKind::Io,
                "Could not write search parameters",
                e.to_string(),
                file_context(path),
            )
        })
    }

    /// Check that the parameters are consistent with each other and with the catalog
    /// # Errors
    /// A `Configuration` error describing the first inconsistency found.
    pub fn validate(&self, catalog: &ModificationCatalog) -> Result<(), DeNovoError> {
        let configuration = |short: &'static str, long: String| {
            Err(DeNovoError::small(
                DeNovoErrorKind::Configuration,
                short,
                long,
            ))
        };
        if self.min_charge == 0 || self.min_charge > self.max_charge {
            return configuration(
                "Invalid charge range",
                format!(
                    "The charge range {}..={} is empty or includes zero",
                    self.min_charge, self.max_charge
                ),
            );
        }
        if self.number_of_solutions == 0 {
            return configuration(
                "Invalid number of solutions",
                "At least one solution per spectrum has to be requested".to_string(),
            );
        }
        if let Some(unknown) = self
            .fixed_modifications
            .iter()
            .chain(&self.variable_modifications)
            .find(|name| !catalog.contains(name))
        {
            return configuration(
                "Unknown modification",
                format!("The modification '{unknown}' is not part of the modification catalog"),
            );
        }
        if let Some(double) = self
            .fixed_modifications
            .iter()
            .find(|name| self.variable_modifications.contains(name))
        {
            return configuration(
                "Modification both fixed and variable",
                format!("The modification '{double}' cannot be both fixed and variable"),
            );
        }
        if self.directag.tag_length == 0 || self.pepnovo.tag_length == 0 {
            return configuration(
                "Invalid tag length",
                "Tags have to contain at least one residue".to_string(),
            );
        }
        Ok(())
    }
}

/// Settings only used by PepNovo+
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct PepNovoParameters {
    /// The scoring model
    pub model: String,
    /// The length of the tags to generate, PepNovo+ reports full peptides when not set
    pub tag_length: usize,
    /// Generate tags instead of full sequences
    pub generate_tags: bool,
    /// Let PepNovo+ correct the precursor mass
    pub correct_precursor_mass: bool,
    /// Let PepNovo+ estimate the charge
    pub estimate_charge: bool,
    /// Skip spectra of low quality
    pub discard_low_quality: bool,
}

impl Default for PepNovoParameters {
    fn default() -> Self {
        Self {
            model: "CID_IT_TRYP".to_string(),
            tag_length: 5,
            generate_tags: false,
            correct_precursor_mass: false,
            estimate_charge: true,
            discard_low_quality: true,
        }
    }
}

/// Settings only used by DirecTag
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct DirecTagParameters {
    /// The number of residues per tag
    pub tag_length: usize,
    /// The maximum number of tags per spectrum
    pub max_tag_count: usize,
    /// The number of most intense peaks to consider
    pub max_peak_count: usize,
    /// The number of intensity classes
    pub intensity_classes: usize,
    /// Let DirecTag adjust the precursor mass
    pub adjust_precursor_mass: bool,
    /// Use the charge states reported in the spectrum file
    pub use_charge_state_from_spectrum: bool,
}

impl Default for DirecTagParameters {
    fn default() -> Self {
        Self {
            tag_length: 4,
            max_tag_count: 10,
            max_peak_count: 100,
            intensity_classes: 3,
            adjust_precursor_mass: false,
            use_charge_state_from_spectrum: true,
        }
    }
}

/// Settings only used by pNovo+
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct PNovoParameters {
    /// The activation type, `HCD`, `CID` or `ETD`
    pub activation_type: String,
    /// The enzyme used for digestion
    pub enzyme: String,
    /// The lowest precursor mass considered
    pub min_precursor_mass: Mass,
    /// The highest precursor mass considered
    pub max_precursor_mass: Mass,
}

impl Default for PNovoParameters {
    fn default() -> Self {
        Self {
            activation_type: "HCD".to_string(),
            enzyme: "Trypsin".to_string(),
            min_precursor_mass: da(300.0),
            max_precursor_mass: da(5000.0),
        }
    }
}

/// Settings only used by Novor
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct NovorParameters {
    /// The fragmentation method, `HCD` or `CID`
    pub fragmentation: String,
    /// The mass analyzer, `Trap`, `TOF` or `FT`
    pub mass_analyzer: String,
    /// The enzyme used for digestion
    pub enzyme: String,
}

impl Default for NovorParameters {
    fn default() -> Self {
        Self {
            fragmentation: "HCD".to_string(),
            mass_analyzer: "Trap".to_string(),
            enzyme: "Trypsin".to_string(),
        }
    }
}

//! The context of one results session: everything that is configured once at the start and then
//! handed by reference to every reader, mapper, and exporter.

use std::path::Path;

use context_error::*;
use tracing::{info, warn};

use dncore::{
    error::{DeNovoError, DeNovoErrorKind},
    modification::ModificationCatalog,
    parameters::SearchParameters,
    spectrum::SpectrumProvider,
};

use crate::{formats::ReaderContext, modification_mapping::ModificationMapping};

/// The modifications, tool specific modification names, and search parameters of a session
#[derive(Clone, Debug, PartialEq)]
pub struct SessionContext {
    /// The canonical modifications
    pub catalog: ModificationCatalog,
    /// The translation of tool specific modification names
    pub mapping: ModificationMapping,
    /// The parameters the results were generated with
    pub parameters: SearchParameters,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::defaults()
    }
}

impl SessionContext {
    /// Create a context from its parts, the parameters are validated against the catalog
    /// # Errors
    /// A `Configuration` error if the parameters refer to unknown modifications or are
    /// inconsistent.
    pub fn new(
        catalog: ModificationCatalog,
        mapping: ModificationMapping,
        parameters: SearchParameters,
    ) -> Result<Self, DeNovoError> {
        parameters.validate(&catalog)?;
        Ok(Self {
            catalog,
            mapping,
            parameters,
        })
    }

    /// The common modifications, the built in mapping tables, and default parameters
    pub fn defaults() -> Self {
        Self {
            catalog: ModificationCatalog::common(),
            mapping: ModificationMapping::default(),
            parameters: SearchParameters::default(),
        }
    }

    /// Load a context from configuration files, every file that is not given is replaced by its
    /// default. Custom catalog entries are added on top of the common modifications.
    /// # Errors
    /// If any of the files could not be read or the result is inconsistent.
    pub fn load(
        catalog: Option<&Path>,
        mapping: Option<&Path>,
        parameters: Option<&Path>,
    ) -> Result<Self, DeNovoError> {
        let mut full_catalog = ModificationCatalog::common();
        if let Some(path) = catalog {
            for modification in ModificationCatalog::from_json_file(path)?.iter() {
                full_catalog.insert(modification.clone());
            }
        }
        let mapping = mapping.map_or_else(
            || Ok(ModificationMapping::default()),
            ModificationMapping::from_json_file,
        )?;
        let parameters = parameters.map_or_else(
            || Ok(SearchParameters::default()),
            SearchParameters::from_json_file,
        )?;
        let context = Self::new(full_catalog, mapping, parameters)?;
        info!(
            "Session with {} modifications, fixed: [{}], variable: [{}]",
            context.catalog.len(),
            context.parameters.fixed_modifications.join(", "),
            context.parameters.variable_modifications.join(", ")
        );
        Ok(context)
    }

    /// Mapping entries pointing at modifications that are missing from the catalog, tokens
    /// resolving to these names cannot be placed on any record
    pub fn mapping_warnings(&self) -> Vec<DeNovoError> {
        self.mapping
            .missing_from(&self.catalog)
            .into_iter()
            .map(|(advocate, token, name)| {
                let error = DeNovoError::small(
                    DeNovoErrorKind::UnmappedModification,
                    format!("Unknown modification '{name}'"),
                    format!(
                        "The {advocate} modification '{token}' maps to '{name}', which is not part of the modification catalog"
                    ),
                );
                warn!("{error}");
                error
            })
            .collect()
    }

    /// The context for the result file readers
    pub fn reader_context<'a>(
        &'a self,
        spectra: Option<&'a dyn SpectrumProvider>,
    ) -> ReaderContext<'a> {
        ReaderContext {
            catalog: &self.catalog,
            mapping: &self.mapping,
            parameters: &self.parameters,
            spectra,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dncore::advocate::Advocate;

    #[test]
    fn defaults_are_consistent() {
        let context = SessionContext::defaults();
        assert!(context.parameters.validate(&context.catalog).is_ok());
        assert!(context.mapping_warnings().is_empty());
    }

    #[test]
    fn unknown_modifications_are_rejected() {
        let parameters = SearchParameters {
            variable_modifications: vec!["Sparkles of W".to_string()],
            ..SearchParameters::default()
        };
        let error = SessionContext::new(
            ModificationCatalog::common(),
            ModificationMapping::default(),
            parameters,
        )
        .unwrap_err();
        assert_eq!(error.get_kind(), DeNovoErrorKind::Configuration);
    }

    #[test]
    fn dangling_mapping_entries() {
        let mut context = SessionContext::defaults();
        context.mapping.insert(Advocate::Novor, "W(Sparkles)", "Sparkles of W");
        let warnings = context.mapping_warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].get_long_description().contains("W(Sparkles)"));
    }
}

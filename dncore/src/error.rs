//! The error type shared by all crates handling de novo results.
//!
//! Errors are [`BoxedError`]s with a [`DeNovoErrorKind`]. Every error has a short description, a
//! longer explanation, and a context pointing at the file and line (if any) where it happened.
//! Errors local to a single record, file, or tool are reported as warnings, see
//! [`DeNovoErrorKind::is_fatal`].

use std::path::Path;

use context_error::*;
use serde::{Deserialize, Serialize};

/// An error or warning with an explanation and its location
pub type DeNovoError = BoxedError<'static, DeNovoErrorKind>;

/// A result with a [`DeNovoError`] as error type
pub type Result<T, E = DeNovoError> = std::result::Result<T, E>;

/// The kind of problem that was encountered
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
pub enum DeNovoErrorKind {
    /// A file could not be opened, read, or written
    #[default]
    Io,
    /// A single record in an otherwise valid file could not be parsed
    Parse,
    /// The file does not follow the layout the reader expects from this tool version
    ToolVersion,
    /// A modification reported by a tool has no counterpart in the modification catalog
    UnmappedModification,
    /// An external sequencing tool exited unsuccessfully
    ToolExecution,
    /// The identification cache could not be opened, locked, read, or written
    Database,
    /// The peptide mapper did not answer in time
    MappingTimeout,
    /// The operation was canceled by the user
    Canceled,
    /// Another heavy operation is already running on the same identification
    Busy,
    /// The configuration is invalid
    Configuration,
}

impl DeNovoErrorKind {
    /// Errors of this kind compromise the whole session, everything else is contained to a single
    /// record, file, tool, or operation.
    pub const fn is_fatal(self) -> bool {
        matches!(self, Self::Database)
    }

    /// Problems of this kind do not stop the operation that encountered them
    pub const fn is_warning(self) -> bool {
        matches!(
            self,
            Self::Parse | Self::UnmappedModification | Self::ToolVersion | Self::MappingTimeout
        )
    }
}

impl ErrorKind for DeNovoErrorKind {
    type Settings = ();
    fn descriptor(&self) -> &'static str {
        if self.is_warning() { "warning" } else { "error" }
    }
    fn ignored(&self, _settings: Self::Settings) -> bool {
        false
    }
    fn is_error(&self, _settings: Self::Settings) -> bool {
        !self.is_warning()
    }
}

/// A context pointing at a whole file
pub fn file_context(path: impl AsRef<Path>) -> Context<'static> {
    Context::none()
        .source(path.as_ref().to_string_lossy())
        .to_owned()
}

/// An IO error for the given file
pub fn io_error(
    path: impl AsRef<Path>,
    short_description: &'static str,
    error: &std::io::Error,
) -> DeNovoError {
    BoxedError::new(
        DeNovoErrorKind::Io,
        short_description,
        error.to_string(),
        file_context(path),
    )
}

/// The error returned when an operation was canceled
pub fn canceled(operation: &str) -> DeNovoError {
    BoxedError::small(
        DeNovoErrorKind::Canceled,
        format!("{operation} canceled"),
        "The operation was canceled before it could complete, results gathered so far are retained",
    )
}

/// Deduplicate warnings so that each distinct problem is only reported once. Identical problems
/// found at different locations are merged into one warning listing all locations.
pub fn deduplicate_warnings(warnings: Vec<DeNovoError>) -> Vec<DeNovoError> {
    let mut output = Vec::with_capacity(warnings.len());
    combine_errors(&mut output, warnings, ());
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_contains_location() {
        let error = DeNovoError::new(
            DeNovoErrorKind::Parse,
            "Invalid PepNovo+ line",
            "The rank score is not a number",
            Context::none()
                .source("run.mgf.out")
                .line_index(4)
                .lines(0, "0\tabc\t1.0")
                .to_owned(),
        );
        assert_eq!(error.get_kind(), DeNovoErrorKind::Parse);
        assert!(!error.get_kind().is_error(()));
        let text = error.to_string();
        assert!(text.contains("Invalid PepNovo+ line"));
        assert!(text.contains("run.mgf.out"));
        assert!(text.contains("abc"));
    }

    #[test]
    fn fatal_kinds() {
        assert!(DeNovoErrorKind::Database.is_fatal());
        assert!(!DeNovoErrorKind::Io.is_fatal());
        assert!(!DeNovoErrorKind::ToolExecution.is_fatal());
        assert!(DeNovoErrorKind::Database.is_error(()));
        assert_eq!(DeNovoErrorKind::MappingTimeout.descriptor(), "warning");
    }

    #[test]
    fn deduplicate() {
        let a = DeNovoError::small(DeNovoErrorKind::UnmappedModification, "x", "y");
        let b = DeNovoError::small(DeNovoErrorKind::Parse, "x", "y");
        let warnings = deduplicate_warnings(vec![a.clone(), b, a]);
        assert_eq!(warnings.len(), 2);
        assert_eq!(
            warnings[0].get_kind(),
            DeNovoErrorKind::UnmappedModification
        );
        assert_eq!(warnings[1].get_kind(), DeNovoErrorKind::Parse);
    }

    #[test]
    fn io_errors_point_at_the_file() {
        let error = io_error(
            "missing.mgf",
            "Could not open file",
            &std::io::Error::from(std::io::ErrorKind::NotFound),
        );
        assert_eq!(error.get_kind(), DeNovoErrorKind::Io);
        assert_eq!(error.get_contexts().len(), 1);
        assert!(error.to_string().contains("missing.mgf"));
    }
}

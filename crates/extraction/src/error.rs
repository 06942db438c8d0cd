//! Extraction error types
//!
//! These never escape a record: the extractor folds them into
//! `ScalarValue::Absent`. They surface in logs and in `lookup` results.

use thiserror::Error;

/// Extraction errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    /// Path expression could not be parsed
    #[error("invalid path expression '{path}': {message}")]
    PathSyntax { path: String, message: String },

    /// Object member missing
    #[error("key '{key}' not found")]
    MissingKey { key: String },

    /// Array index outside bounds
    #[error("index {index} out of range for array of length {len}")]
    IndexOutOfRange { index: i64, len: usize },

    /// Segment applied to a value of the wrong kind
    #[error("segment '{segment}' expects {expected}, found {found}")]
    TypeMismatch {
        segment: String,
        expected: &'static str,
        found: &'static str,
    },
}

impl ExtractionError {
    pub fn path_syntax(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PathSyntax {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Extraction Result type alias
pub type Result<T> = std::result::Result<T, ExtractionError>;

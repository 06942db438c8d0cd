//! Error types for CLI operations.

use std::path::Path;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    /// Query rejected by every ref
    #[error("Query rejected: {message}")]
    QueryRejected { message: String },

    #[error("Stream failed: {0}")]
    Stream(#[from] datasource::DatasourceError),

    #[error("Failed to create sinks: {0}")]
    Sinks(#[from] dispatcher::DispatcherError),

    #[error("Replay failed: {0}")]
    Replay(#[from] ingestion::IngestionError),
}

impl CliError {
    pub fn file_not_found(path: &Path) -> Self {
        Self::FileNotFound {
            path: path.display().to_string(),
        }
    }

    pub fn query_rejected(message: impl Into<String>) -> Self {
        Self::QueryRejected {
            message: message.into(),
        }
    }
}

/// Fail with `FileNotFound` unless `path` exists
pub fn ensure_exists(path: &Path) -> Result<(), CliError> {
    if path.exists() {
        Ok(())
    } else {
        Err(CliError::file_not_found(path))
    }
}

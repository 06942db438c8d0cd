//! Datasource error types

use contracts::ContractError;
use dispatcher::DispatcherError;
use ingestion::IngestionError;
use thiserror::Error;

/// Datasource errors
#[derive(Debug, Error)]
pub enum DatasourceError {
    /// Query payload could not be parsed or validated
    #[error("invalid query: {0}")]
    Query(#[from] ContractError),

    /// Retopic failed; no subscription is active
    #[error("subscription failed: {0}")]
    Subscription(#[from] IngestionError),

    #[error("stream failed: {0}")]
    Stream(#[from] DispatcherError),

    /// Path other than the single stream path
    #[error("stream '{path}' not found")]
    StreamNotFound { path: String },

    /// Another `run_stream` owns the internal queue
    #[error("stream '{path}' is already running")]
    StreamBusy { path: String },
}

/// Datasource Result type alias
pub type Result<T> = std::result::Result<T, DatasourceError>;

impl DatasourceError {
    /// Short label for logs and query responses
    pub fn category(&self) -> &'static str {
        match self {
            Self::Query(e) => e.category(),
            Self::Subscription(_) => "broker",
            Self::Stream(_) | Self::StreamNotFound { .. } | Self::StreamBusy { .. } => "stream",
        }
    }
}

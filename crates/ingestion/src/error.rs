//! Ingestion error types

use contracts::ContractError;
use thiserror::Error;

/// Ingestion errors
#[derive(Debug, Error)]
pub enum IngestionError {
    /// Broker rejected the subscription; no subscription is active afterwards
    #[error("failed to subscribe to '{topic}': {source}")]
    SubscribeFailed {
        topic: String,
        #[source]
        source: ContractError,
    },

    /// Broker rejected the unsubscribe; the old subscription is muted regardless
    #[error("failed to unsubscribe from '{topic}': {source}")]
    UnsubscribeFailed {
        topic: String,
        #[source]
        source: ContractError,
    },

    /// Topic string is empty
    #[error("topic cannot be empty")]
    EmptyTopic,

    /// Replay file line could not be parsed
    #[error("replay line {line}: {message}")]
    ReplayParse { line: usize, message: String },

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Ingestion Result type alias
pub type Result<T> = std::result::Result<T, IngestionError>;

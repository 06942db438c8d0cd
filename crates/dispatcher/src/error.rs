//! Dispatcher error types

use contracts::{ContractError, SinkType};
use thiserror::Error;

use crate::dispatcher::DispatcherState;

#[derive(Debug, Error)]
pub enum DispatcherError {
    /// A configured consumer could not be opened
    #[error("cannot open {kind:?} sink '{name}'")]
    SinkCreation {
        name: String,
        kind: SinkType,
        #[source]
        source: ContractError,
    },

    /// `run` called on a dispatcher that is not idle
    #[error("dispatcher cannot start from state {state:?}")]
    InvalidState { state: DispatcherState },
}

impl DispatcherError {
    pub fn sink_creation(name: impl Into<String>, kind: SinkType, source: ContractError) -> Self {
        Self::SinkCreation {
            name: name.into(),
            kind,
            source,
        }
    }

    /// Name of the sink that failed to open, if this is a creation error
    pub fn sink_name(&self) -> Option<&str> {
        match self {
            Self::SinkCreation { name, .. } => Some(name),
            Self::InvalidState { .. } => None,
        }
    }
}

//! Errors shared across crate boundaries

use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum ContractError {
    /// Query or config text is not well-formed
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Well-formed, but a value is out of range or inconsistent
    #[error("invalid '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    /// Broker unreachable or credentials refused
    #[error("broker '{endpoint}' unavailable: {message}")]
    BrokerConnection { endpoint: String, message: String },

    #[error("subscription to '{topic}' failed: {message}")]
    Subscription { topic: String, message: String },

    #[error("sink '{sink_name}' write failed: {message}")]
    SinkWrite { sink_name: String, message: String },

    /// Sink could not be opened, or its receiving side has gone away
    #[error("sink '{sink_name}' unreachable: {message}")]
    SinkConnection { sink_name: String, message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ContractError {
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn broker_connection(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BrokerConnection {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    pub fn subscription(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Subscription {
            topic: topic.into(),
            message: message.into(),
        }
    }

    pub fn sink_write(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkWrite {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    pub fn sink_connection(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkConnection {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    /// Short label for logs: `config`, `broker`, `sink` or `io`
    pub fn category(&self) -> &'static str {
        match self {
            Self::ConfigParse { .. } | Self::ConfigValidation { .. } => "config",
            Self::BrokerConnection { .. } | Self::Subscription { .. } => "broker",
            Self::SinkWrite { .. } | Self::SinkConnection { .. } => "sink",
            Self::Io(_) => "io",
        }
    }
}

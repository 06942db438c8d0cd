//! Configuration models
//!
//! - `QueryModel`: per-query payload (JSON wire contract)
//! - `AppConfig`: datasource settings, stream tuning and consumer routing

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use validator::Validate;

/// Default path used when a query carries no extraction options
pub const DEFAULT_JSONPATH: &str = "$";
/// Default alias used when a query carries no extraction options
pub const DEFAULT_ALIAS: &str = "mqtt_message";
/// Topic used when a query names none
pub const DEFAULT_TOPIC: &str = "topic";

// ===== Query payload =====

/// One extraction option as sent by the query editor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonpathOption {
    /// Path expression
    pub jsonpath: String,

    /// Output column name (`"time"` is reserved)
    pub alias: String,

    /// `"string"` or `"number"`
    pub data_type: String,
}

impl JsonpathOption {
    pub fn new(
        jsonpath: impl Into<String>,
        alias: impl Into<String>,
        data_type: impl Into<String>,
    ) -> Self {
        Self {
            jsonpath: jsonpath.into(),
            alias: alias.into(),
            data_type: data_type.into(),
        }
    }
}

/// Query payload
///
/// ```json
/// { "topic": "sensors/a", "jsonpathOptions": [ { "jsonpath": "$.temp", "alias": "temperature", "dataType": "number" } ] }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryModel {
    /// Topic to subscribe to
    #[serde(default = "default_topic")]
    pub topic: String,

    /// Ordered extraction options
    #[serde(default = "default_jsonpath_options")]
    pub jsonpath_options: Vec<JsonpathOption>,
}

fn default_topic() -> String {
    DEFAULT_TOPIC.to_string()
}

fn default_jsonpath_options() -> Vec<JsonpathOption> {
    vec![JsonpathOption::new(DEFAULT_JSONPATH, DEFAULT_ALIAS, "string")]
}

impl Default for QueryModel {
    fn default() -> Self {
        Self {
            topic: default_topic(),
            jsonpath_options: default_jsonpath_options(),
        }
    }
}

// ===== Application config =====

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AppConfig {
    /// Broker connection settings
    #[validate(nested)]
    pub datasource: DatasourceSettings,

    /// Stream tuning
    #[serde(default)]
    #[validate(nested)]
    pub stream: StreamSettings,

    /// Consumer routing
    #[serde(default)]
    pub sinks: Vec<SinkConfig>,
}

/// Broker connection settings
#[derive(Clone, Serialize, Deserialize, Validate)]
pub struct DatasourceSettings {
    /// Datasource instance identifier (used in the channel address)
    #[serde(default = "default_uid")]
    #[validate(length(min = 1, message = "uid cannot be empty"))]
    pub uid: String,

    /// Broker `host:port`
    #[validate(length(min = 1, message = "endpoint cannot be empty"))]
    pub endpoint: String,

    /// Username (applied only when non-empty)
    #[serde(default)]
    pub username: String,

    /// Password (applied only when non-empty)
    #[serde(default, skip_serializing)]
    pub password: String,
}

fn default_uid() -> String {
    "mqtt".to_string()
}

impl DatasourceSettings {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            uid: default_uid(),
            endpoint: endpoint.into(),
            username: String::new(),
            password: String::new(),
        }
    }

    /// Broker URL (`tcp://{endpoint}`)
    pub fn broker_url(&self) -> String {
        format!("tcp://{}", self.endpoint)
    }

    /// Live channel address for this datasource instance
    pub fn stream_channel(&self) -> String {
        format!("ds/{}/{}", self.uid, crate::STREAM_PATH)
    }

    pub fn has_credentials(&self) -> bool {
        !self.username.is_empty() || !self.password.is_empty()
    }
}

impl fmt::Debug for DatasourceSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatasourceSettings")
            .field("uid", &self.uid)
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field(
                "password",
                &if self.password.is_empty() { "" } else { "***" },
            )
            .finish()
    }
}

/// Stream tuning
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StreamSettings {
    /// Internal queue capacity (messages)
    #[serde(default = "default_stream_queue_capacity")]
    #[validate(range(min = 1, message = "queue_capacity must be > 0"))]
    pub queue_capacity: usize,

    /// Overflow policy of the internal queue
    #[serde(default)]
    pub drop_policy: DropPolicy,

    /// Per-write tolerance for a consumer (milliseconds)
    #[serde(default = "default_consumer_timeout_ms")]
    #[validate(range(min = 1, message = "consumer_timeout_ms must be > 0"))]
    pub consumer_timeout_ms: u64,
}

fn default_stream_queue_capacity() -> usize {
    1024
}

fn default_consumer_timeout_ms() -> u64 {
    1000
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            queue_capacity: default_stream_queue_capacity(),
            drop_policy: DropPolicy::default(),
            consumer_timeout_ms: default_consumer_timeout_ms(),
        }
    }
}

/// Overflow policy when a bounded queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropPolicy {
    /// Evict the oldest queued item to admit the new one
    #[default]
    DropOldest,
    /// Discard the incoming item
    DropNewest,
}

/// Consumer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Sink name
    pub name: String,

    /// Sink type
    pub sink_type: SinkType,

    /// Per-consumer queue capacity
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Type-specific parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

fn default_queue_capacity() -> usize {
    100
}

/// Sink type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// Log frame summaries
    Log,
    /// Append frames as JSON lines
    File,
    /// UDP datagrams
    Network,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_model_wire_shape() {
        let json = r#"{
            "topic": "sensors/a",
            "jsonpathOptions": [
                { "jsonpath": "$.temp", "alias": "temperature", "dataType": "number" }
            ]
        }"#;
        let query: QueryModel = serde_json::from_str(json).unwrap();
        assert_eq!(query.topic, "sensors/a");
        assert_eq!(query.jsonpath_options.len(), 1);
        assert_eq!(query.jsonpath_options[0].data_type, "number");
    }

    #[test]
    fn query_model_defaults_options() {
        let query: QueryModel = serde_json::from_str(r#"{ "topic": "t" }"#).unwrap();
        assert_eq!(query.jsonpath_options.len(), 1);
        assert_eq!(query.jsonpath_options[0].jsonpath, DEFAULT_JSONPATH);
        assert_eq!(query.jsonpath_options[0].alias, DEFAULT_ALIAS);
    }

    #[test]
    fn query_model_empty_object_uses_defaults() {
        let query: QueryModel = serde_json::from_str("{}").unwrap();
        assert_eq!(query, QueryModel::default());
        assert_eq!(query.topic, DEFAULT_TOPIC);
    }

    #[test]
    fn datasource_settings_hide_password() {
        let mut settings = DatasourceSettings::new("localhost:1883");
        settings.password = "secret".into();

        let debug = format!("{settings:?}");
        assert!(!debug.contains("secret"));

        let json = serde_json::to_string(&settings).unwrap();
        assert!(!json.contains("secret"));
        assert_eq!(settings.broker_url(), "tcp://localhost:1883");
        assert_eq!(settings.stream_channel(), "ds/mqtt/stream");
    }

    #[test]
    fn stream_settings_defaults() {
        let settings = StreamSettings::default();
        assert_eq!(settings.queue_capacity, 1024);
        assert_eq!(settings.drop_policy, DropPolicy::DropOldest);
        assert_eq!(settings.consumer_timeout_ms, 1000);
    }

    #[test]
    fn settings_validation() {
        let settings = DatasourceSettings::new("");
        assert!(settings.validate().is_err());
        assert!(DatasourceSettings::new("localhost:1883").validate().is_ok());
    }
}

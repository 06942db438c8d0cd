//! # Config Loader
//!
//! Configuration loading and parsing module.
//!
//! Responsibilities:
//! - Parse TOML/JSON application configuration files
//! - Parse JSON query payloads
//! - Validate both and produce typed models (`AppConfig`, `FieldSpecSet`)
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let config = ConfigLoader::load_from_path(Path::new("config.toml")).unwrap();
//! println!("Broker: {}", config.datasource.broker_url());
//!
//! let specs = ConfigLoader::load_query(r#"{"topic":"sensors/a"}"#).unwrap();
//! assert_eq!(specs.topic(), "sensors/a");
//! ```

mod parser;
mod validator;

pub use contracts::{AppConfig, FieldSpecSet, QueryModel};
pub use parser::ConfigFormat;

use contracts::ContractError;
use std::path::Path;

/// Configuration loader
///
/// Provides static methods to load configuration from files or strings.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load application configuration from file path
    ///
    /// Automatically detects format from file extension (.toml / .json).
    ///
    /// # Errors
    /// - File read failure
    /// - Unsupported format
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_path(path: &Path) -> Result<AppConfig, ContractError> {
        let format = Self::detect_format(path)?;
        let content = Self::read_file(path)?;
        Self::load_from_str(&content, format)
    }

    /// Load application configuration from string
    ///
    /// # Errors
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_str(content: &str, format: ConfigFormat) -> Result<AppConfig, ContractError> {
        let config = parser::parse(content, format)?;
        validator::validate_app_config(&config)?;
        Ok(config)
    }

    /// Parse a JSON query payload without validating it
    pub fn parse_query(content: &str) -> Result<QueryModel, ContractError> {
        parser::parse_query(content)
    }

    /// Validate a parsed query and build its rule set
    pub fn build_field_specs(query: &QueryModel) -> Result<FieldSpecSet, ContractError> {
        validator::validate_query(query)
    }

    /// Parse and validate a JSON query payload
    pub fn load_query(content: &str) -> Result<FieldSpecSet, ContractError> {
        let query = Self::parse_query(content)?;
        Self::build_field_specs(&query)
    }

    /// Parse and validate a JSON query payload stored in a file
    pub fn load_query_from_path(path: &Path) -> Result<FieldSpecSet, ContractError> {
        let content = Self::read_file(path)?;
        Self::load_query(&content)
    }

    /// Serialize AppConfig to TOML string (password omitted)
    pub fn to_toml(config: &AppConfig) -> Result<String, ContractError> {
        toml::to_string_pretty(config)
            .map_err(|e| ContractError::config_parse(format!("TOML serialize error: {e}")))
    }

    /// Serialize AppConfig to JSON string (password omitted)
    pub fn to_json(config: &AppConfig) -> Result<String, ContractError> {
        serde_json::to_string_pretty(config)
            .map_err(|e| ContractError::config_parse(format!("JSON serialize error: {e}")))
    }
}

impl ConfigLoader {
    /// Infer configuration format from file extension
    fn detect_format(path: &Path) -> Result<ConfigFormat, ContractError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            ContractError::config_parse("cannot determine file format from extension")
        })?;

        ConfigFormat::from_extension(ext).ok_or_else(|| {
            ContractError::config_parse(format!("unsupported config format: .{ext}"))
        })
    }

    /// Read configuration file content
    fn read_file(path: &Path) -> Result<String, ContractError> {
        Ok(std::fs::read_to_string(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL_TOML: &str = r#"
[datasource]
uid = "plant-a"
endpoint = "localhost:1883"

[stream]
queue_capacity = 64

[[sinks]]
name = "log_sink"
sink_type = "log"
"#;

    #[test]
    fn test_load_from_str_toml() {
        let config = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml).unwrap();
        assert_eq!(config.datasource.uid, "plant-a");
        assert_eq!(config.stream.queue_capacity, 64);
    }

    #[test]
    fn test_round_trip_toml() {
        let config = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml).unwrap();
        let serialized = ConfigLoader::to_toml(&config).unwrap();
        let config2 = ConfigLoader::load_from_str(&serialized, ConfigFormat::Toml).unwrap();
        assert_eq!(config.datasource.endpoint, config2.datasource.endpoint);
        assert_eq!(config.sinks.len(), config2.sinks.len());
    }

    #[test]
    fn test_round_trip_json() {
        let config = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml).unwrap();
        let json = ConfigLoader::to_json(&config).unwrap();
        let config2 = ConfigLoader::load_from_str(&json, ConfigFormat::Json).unwrap();
        assert_eq!(config.datasource.uid, config2.datasource.uid);
    }

    #[test]
    fn test_validation_runs_after_parse() {
        let content = r#"
[datasource]
endpoint = "localhost:1883"

[[sinks]]
name = "log"
sink_type = "log"

[[sinks]]
name = "log"
sink_type = "log"
"#;
        let err = ConfigLoader::load_from_str(content, ConfigFormat::Toml).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_load_query() {
        let specs = ConfigLoader::load_query(
            r#"{"topic":"sensors/a","jsonpathOptions":[{"jsonpath":"$.temp","alias":"temperature","dataType":"number"}]}"#,
        )
        .unwrap();
        assert_eq!(specs.topic(), "sensors/a");
        assert_eq!(specs.specs()[0].output_name, "temperature");
    }

    #[test]
    fn test_empty_query_gets_default_topic() {
        let specs = ConfigLoader::load_query("{}").unwrap();
        assert_eq!(specs.topic(), contracts::DEFAULT_TOPIC);
        assert_eq!(specs.len(), 1);
        assert_eq!(specs.specs()[0].output_name, contracts::DEFAULT_ALIAS);
    }

    #[test]
    fn test_load_from_path_detects_format() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(MINIMAL_TOML.as_bytes()).unwrap();
        let config = ConfigLoader::load_from_path(file.path()).unwrap();
        assert_eq!(config.sinks.len(), 1);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ConfigLoader::load_from_path(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ContractError::Io(_)));

        let err = ConfigLoader::load_query_from_path(&dir.path().join("absent.json")).unwrap_err();
        assert_eq!(err.category(), "io");
    }

    #[test]
    fn test_unsupported_extension() {
        let file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        let err = ConfigLoader::load_from_path(file.path()).unwrap_err();
        assert!(err.to_string().contains("unsupported config format"));
    }
}

//! Configuration validation
//!
//! Query rules:
//! - topic is not empty
//! - every option has a path, an alias and a known data type
//! - aliases are unique (the reserved `time` alias included)
//!
//! App config rules:
//! - field constraints declared on the models (`validator` derive)
//! - sink names are non-empty and unique
//! - network sinks carry an `addr` parameter

use std::collections::HashSet;

use contracts::{
    AppConfig, ContractError, FieldSpec, FieldSpecSet, QueryModel, ScalarType, SinkType,
};
use ::validator::Validate;

/// Validate a query and turn it into an immutable rule set
pub fn validate_query(query: &QueryModel) -> Result<FieldSpecSet, ContractError> {
    if query.topic.trim().is_empty() {
        return Err(ContractError::config_validation(
            "topic",
            "topic cannot be empty",
        ));
    }

    let specs = query
        .jsonpath_options
        .iter()
        .enumerate()
        .map(|(idx, option)| {
            if option.jsonpath.trim().is_empty() {
                return Err(ContractError::config_validation(
                    format!("jsonpathOptions[{idx}].jsonpath"),
                    "jsonpath cannot be empty",
                ));
            }
            if option.alias.is_empty() {
                return Err(ContractError::config_validation(
                    format!("jsonpathOptions[{idx}].alias"),
                    "alias cannot be empty",
                ));
            }
            let scalar_type = ScalarType::from_name(&option.data_type).ok_or_else(|| {
                ContractError::config_validation(
                    format!("jsonpathOptions[{idx}].dataType"),
                    format!(
                        "unknown data type '{}', expected 'string' or 'number'",
                        option.data_type
                    ),
                )
            })?;
            Ok(FieldSpec::new(
                option.jsonpath.trim(),
                option.alias.clone(),
                scalar_type,
            ))
        })
        .collect::<Result<Vec<_>, _>>()?;

    FieldSpecSet::new(query.topic.trim(), specs)
}

/// Validate an application config
///
/// Returns the first error encountered.
pub fn validate_app_config(config: &AppConfig) -> Result<(), ContractError> {
    config
        .validate()
        .map_err(|e| ContractError::config_validation("config", e.to_string()))?;
    validate_sinks(config)?;
    Ok(())
}

fn validate_sinks(config: &AppConfig) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, sink) in config.sinks.iter().enumerate() {
        if sink.name.is_empty() {
            return Err(ContractError::config_validation(
                format!("sinks[{}].name", idx),
                "sink name cannot be empty",
            ));
        }
        if !seen.insert(sink.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("sinks[name={}]", sink.name),
                "duplicate sink name",
            ));
        }
        if sink.queue_capacity == 0 {
            return Err(ContractError::config_validation(
                format!("sinks[{}].queue_capacity", sink.name),
                "queue_capacity must be > 0",
            ));
        }
        if sink.sink_type == SinkType::Network && !sink.params.contains_key("addr") {
            return Err(ContractError::config_validation(
                format!("sinks[{}].params.addr", sink.name),
                "network sink requires 'addr'",
            ));
        }
    }
    Ok(())
}

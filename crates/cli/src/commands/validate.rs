//! `validate` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;
use tracing::info;

use config_loader::ConfigLoader;
use contracts::{AppConfig, FieldSpecSet};
use extraction::JsonPath;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    query: FileResult<QuerySummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    config: Option<FileResult<ConfigSummary>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<String>,
}

#[derive(Serialize)]
struct FileResult<T> {
    path: String,
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<T>,
}

impl<T> FileResult<T> {
    fn ok(path: &Path, summary: T) -> Self {
        Self {
            path: path.display().to_string(),
            valid: true,
            error: None,
            summary: Some(summary),
        }
    }

    fn err(path: &Path, error: impl Into<String>) -> Self {
        Self {
            path: path.display().to_string(),
            valid: false,
            error: Some(error.into()),
            summary: None,
        }
    }
}

#[derive(Serialize)]
struct QuerySummary {
    topic: String,
    field_count: usize,
    has_time_field: bool,
}

#[derive(Serialize)]
struct ConfigSummary {
    endpoint: String,
    queue_capacity: usize,
    sink_count: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(query = %args.query.display(), "Validating query");

    let result = validate(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Validation failed")
    }
}

fn validate(args: &ValidateArgs) -> ValidationResult {
    let mut warnings = Vec::new();

    let query = match load_query(&args.query) {
        Ok(specs) => {
            warnings.extend(query_warnings(&specs));
            FileResult::ok(
                &args.query,
                QuerySummary {
                    topic: specs.topic().to_string(),
                    field_count: specs.len(),
                    has_time_field: specs.time_spec().is_some(),
                },
            )
        }
        Err(e) => FileResult::err(&args.query, e),
    };

    let config = args.config.as_ref().map(|path| match load_config(path) {
        Ok(app) => {
            if app.sinks.is_empty() {
                warnings.push("No sinks configured - frames will only be summarized".to_string());
            }
            FileResult::ok(
                path,
                ConfigSummary {
                    endpoint: app.datasource.endpoint.clone(),
                    queue_capacity: app.stream.queue_capacity,
                    sink_count: app.sinks.len(),
                },
            )
        }
        Err(e) => FileResult::err(path, e),
    });

    ValidationResult {
        valid: query.valid && config.as_ref().is_none_or(|c| c.valid),
        query,
        config,
        warnings,
    }
}

fn load_query(path: &Path) -> std::result::Result<FieldSpecSet, String> {
    if !path.exists() {
        return Err(format!("File not found: {}", path.display()));
    }
    ConfigLoader::load_query_from_path(path).map_err(|e| e.to_string())
}

fn load_config(path: &Path) -> std::result::Result<AppConfig, String> {
    if !path.exists() {
        return Err(format!("File not found: {}", path.display()));
    }
    ConfigLoader::load_from_path(path).map_err(|e| e.to_string())
}

/// Non-fatal issues: paths that never resolve
fn query_warnings(specs: &FieldSpecSet) -> Vec<String> {
    specs
        .specs()
        .iter()
        .filter_map(|spec| {
            JsonPath::parse(&spec.path).err().map(|e| {
                format!(
                    "Field '{}' will always be empty: {}",
                    spec.output_name, e
                )
            })
        })
        .collect()
}

fn print_validation_result(result: &ValidationResult) {
    if result.query.valid {
        println!("✓ Query is valid: {}", result.query.path);
        if let Some(ref summary) = result.query.summary {
            println!("\n  Topic: {}", summary.topic);
            println!("  Fields: {}", summary.field_count);
            println!("  Time from message: {}", summary.has_time_field);
        }
    } else {
        println!("✗ Query is invalid: {}", result.query.path);
        if let Some(ref error) = result.query.error {
            println!("\n  Error: {}", error);
        }
    }

    if let Some(ref config) = result.config {
        if config.valid {
            println!("\n✓ Configuration is valid: {}", config.path);
            if let Some(ref summary) = config.summary {
                println!("\n  Endpoint: {}", summary.endpoint);
                println!("  Queue capacity: {}", summary.queue_capacity);
                println!("  Sinks: {}", summary.sink_count);
            }
        } else {
            println!("\n✗ Configuration is invalid: {}", config.path);
            if let Some(ref error) = config.error {
                println!("\n  Error: {}", error);
            }
        }
    }

    if !result.warnings.is_empty() {
        println!("\n⚠ Warnings:");
        for warning in &result.warnings {
            println!("  - {}", warning);
        }
    }
}

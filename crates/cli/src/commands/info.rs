//! `info` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use config_loader::ConfigLoader;
use contracts::FieldSpecSet;
use extraction::JsonPath;

use crate::cli::InfoArgs;
use crate::error::ensure_exists;

/// Extraction plan for JSON output
#[derive(Serialize)]
struct QueryInfo {
    topic: String,
    topic_is_filter: bool,
    columns: Vec<ColumnInfo>,
    time_source: TimeSource,
}

#[derive(Serialize)]
struct ColumnInfo {
    name: String,
    path: String,
    data_type: String,
    /// Parsed path segments, empty when the path does not parse
    segments: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    path_error: Option<String>,
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum TimeSource {
    /// Taken from the message at `path`, column at `position`
    Message { path: String, position: usize },
    /// Arrival time, appended as the last column
    Arrival,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(query = %args.query.display(), "Loading query info");

    ensure_exists(&args.query)?;

    let specs = ConfigLoader::load_query_from_path(&args.query)
        .with_context(|| format!("Failed to load query from {}", args.query.display()))?;

    let info = build_query_info(&specs);
    if args.json {
        let json = serde_json::to_string_pretty(&info).context("Failed to serialize query info")?;
        println!("{}", json);
    } else {
        print_query_info(&info);
    }

    Ok(())
}

fn build_query_info(specs: &FieldSpecSet) -> QueryInfo {
    let columns = specs
        .specs()
        .iter()
        .map(|spec| {
            let (segments, path_error) = match JsonPath::parse(&spec.path) {
                Ok(path) => (
                    path.segments().iter().map(ToString::to_string).collect(),
                    None,
                ),
                Err(e) => (Vec::new(), Some(e.to_string())),
            };
            ColumnInfo {
                name: spec.output_name.clone(),
                path: spec.path.clone(),
                data_type: if spec.is_time() {
                    "time".to_string()
                } else {
                    spec.scalar_type.to_string()
                },
                segments,
                path_error,
            }
        })
        .collect();

    let time_source = match (specs.time_index(), specs.time_spec()) {
        (Some(position), Some(spec)) => TimeSource::Message {
            path: spec.path.clone(),
            position,
        },
        _ => TimeSource::Arrival,
    };

    QueryInfo {
        topic: specs.topic().to_string(),
        topic_is_filter: specs.topic().is_filter(),
        columns,
        time_source,
    }
}

fn print_query_info(info: &QueryInfo) {
    println!("\n=== Extraction Plan ===\n");
    println!("Topic: {}", info.topic);
    if info.topic_is_filter {
        println!("  (wildcard filter)");
    }

    println!("\nColumns ({}):", info.columns.len());
    for column in &info.columns {
        println!("  - {} [{}] <- {}", column.name, column.data_type, column.path);
        if let Some(ref error) = column.path_error {
            println!("      ⚠ path does not parse, column will always be empty: {}", error);
        }
    }

    match &info.time_source {
        TimeSource::Message { path, position } => {
            println!("\nTime: from message at {} (column {})", path, position)
        }
        TimeSource::Arrival => println!("\nTime: arrival time, appended as last column"),
    }
    println!();
}

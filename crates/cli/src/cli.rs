//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// MQTT Stream - turn MQTT JSON messages into typed frames
#[derive(Parser, Debug)]
#[command(
    name = "mqtt-stream",
    author,
    version,
    about = "MQTT JSON message streaming datasource",
    long_about = "Subscribes to an MQTT topic, extracts fields from every JSON message \n\
                  with path expressions, and streams one typed frame per message to \n\
                  the configured sinks."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "MQTT_STREAM_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "MQTT_STREAM_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Stream frames for a query
    Run(RunArgs),

    /// Validate a query (and optionally an application config)
    Validate(ValidateArgs),

    /// Display the extraction plan of a query
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to application configuration file (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "config.toml",
        env = "MQTT_STREAM_CONFIG"
    )]
    pub config: PathBuf,

    /// Path to the query payload (JSON)
    #[arg(long, env = "MQTT_STREAM_QUERY")]
    pub query: PathBuf,

    /// Override the broker endpoint (host:port) from configuration
    #[arg(long, env = "MQTT_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Override the broker username from configuration
    #[arg(long, env = "MQTT_USERNAME")]
    pub username: Option<String>,

    /// Broker password
    #[arg(long, env = "MQTT_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// JSONL file of {"topic": .., "payload": ..} records published onto the broker
    #[arg(long)]
    pub replay: Option<PathBuf>,

    /// Replay speed multiplier (0 = as fast as possible)
    #[arg(long, default_value = "1.0")]
    pub replay_speed: f64,

    /// Pause between replayed records in milliseconds
    #[arg(long, default_value = "0")]
    pub replay_interval_ms: u64,

    /// Keep streaming after the replay file is exhausted
    #[arg(long)]
    pub follow: bool,

    /// Maximum number of frames to stream (0 = unlimited)
    #[arg(long, default_value = "0", env = "MQTT_STREAM_MAX_FRAMES")]
    pub max_frames: u64,

    /// Run timeout in seconds (0 = no timeout)
    #[arg(long, default_value = "0", env = "MQTT_STREAM_TIMEOUT")]
    pub timeout: u64,

    /// Validate configuration and query, then exit without streaming
    #[arg(long)]
    pub dry_run: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "9000", env = "MQTT_STREAM_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to the query payload to validate
    #[arg(long)]
    pub query: PathBuf,

    /// Application configuration file to validate as well
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to the query payload
    #[arg(long)]
    pub query: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}

impl Cli {
    /// Filter applied when `RUST_LOG` is unset
    pub fn default_log_level(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_args() {
        let cli = Cli::parse_from([
            "mqtt-stream",
            "run",
            "--query",
            "query.json",
            "--replay",
            "messages.jsonl",
            "--max-frames",
            "10",
            "--metrics-port",
            "0",
        ]);

        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.query, PathBuf::from("query.json"));
                assert_eq!(args.replay, Some(PathBuf::from("messages.jsonl")));
                assert_eq!(args.max_frames, 10);
                assert_eq!(args.metrics_port, 0);
                assert!(!args.follow);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_verbose_and_quiet_conflict() {
        let result = Cli::try_parse_from(["mqtt-stream", "-v", "-q", "info", "--query", "q.json"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_default_log_level() {
        let quiet = Cli::parse_from(["mqtt-stream", "-q", "info", "--query", "q.json"]);
        assert_eq!(quiet.default_log_level(), "error");

        let chatty = Cli::parse_from(["mqtt-stream", "-vv", "info", "--query", "q.json"]);
        assert_eq!(chatty.default_log_level(), "trace");
        assert_eq!(
            observability::LogFormat::from(chatty.log_format),
            observability::LogFormat::Pretty
        );
    }
}

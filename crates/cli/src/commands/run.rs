//! `run` command implementation.

use anyhow::{Context, Result};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use config_loader::ConfigLoader;
use contracts::AppConfig;

use crate::cli::RunArgs;
use crate::error::{ensure_exists, CliError};
use crate::pipeline::{Pipeline, PipelineConfig};

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    ensure_exists(&args.config)?;
    ensure_exists(&args.query)?;

    let mut app = ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    apply_overrides(&mut app, args);

    let query = std::fs::read_to_string(&args.query)
        .with_context(|| format!("Failed to read query from {}", args.query.display()))?;
    let specs = ConfigLoader::load_query(&query)
        .with_context(|| format!("Invalid query in {}", args.query.display()))?;

    info!(
        endpoint = %app.datasource.endpoint,
        topic = %specs.topic(),
        fields = specs.len(),
        sinks = app.sinks.len(),
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&app, &specs);
        return Ok(());
    }

    let pipeline_config = PipelineConfig {
        app,
        query,
        max_frames: (args.max_frames > 0).then_some(args.max_frames),
        timeout: (args.timeout > 0).then(|| Duration::from_secs(args.timeout)),
        metrics_port: (args.metrics_port > 0).then_some(args.metrics_port),
        replay_path: args.replay.clone(),
        replay_speed: args.replay_speed,
        replay_interval: Duration::from_millis(args.replay_interval_ms),
        follow: args.follow,
    };

    let shutdown = CancellationToken::new();
    let signal_task = tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            warn!("Received shutdown signal, stopping pipeline...");
            shutdown.cancel();
        }
    });

    info!("Starting pipeline...");
    let result = Pipeline::new(pipeline_config).run(shutdown).await;
    signal_task.abort();

    let stats = result.context("Pipeline execution failed")?;
    info!(
        frames = stats.frames_received,
        duration_secs = stats.duration.as_secs_f64(),
        fps = format!("{:.2}", stats.fps()),
        "Pipeline completed successfully"
    );
    stats.print_summary();

    info!("MQTT Stream finished");
    Ok(())
}

fn apply_overrides(app: &mut AppConfig, args: &RunArgs) {
    if let Some(ref endpoint) = args.endpoint {
        info!(endpoint = %endpoint, "Overriding broker endpoint from CLI");
        app.datasource.endpoint = endpoint.clone();
    }
    if let Some(ref username) = args.username {
        app.datasource.username = username.clone();
    }
    if let Some(ref password) = args.password {
        app.datasource.password = password.clone();
    }
}

/// Resolve on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(app: &AppConfig, specs: &contracts::FieldSpecSet) {
    println!("\n=== Configuration Summary ===\n");
    println!("Datasource:");
    println!("  UID: {}", app.datasource.uid);
    println!("  Broker: {}", app.datasource.broker_url());
    println!("  Channel: {}", app.datasource.stream_channel());

    println!("\nStream:");
    println!("  Queue capacity: {}", app.stream.queue_capacity);
    println!("  Drop policy: {:?}", app.stream.drop_policy);
    println!("  Consumer timeout: {}ms", app.stream.consumer_timeout_ms);

    println!("\nQuery:");
    println!("  Topic: {}", specs.topic());
    for spec in specs.specs() {
        println!("  - {} <- {} ({})", spec.output_name, spec.path, spec.scalar_type);
    }

    if !app.sinks.is_empty() {
        println!("\nSinks ({}):", app.sinks.len());
        for sink in &app.sinks {
            println!("  - {} ({:?})", sink.name, sink.sink_type);
        }
    }

    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use crate::cli::{Cli, Commands};

    fn run_args(extra: &[&str]) -> RunArgs {
        let mut argv = vec!["mqtt-stream", "run", "--query", "q.json"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Commands::Run(args) => args,
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_overrides_applied() {
        let mut app = ConfigLoader::load_from_str(
            "[datasource]\nendpoint = \"localhost:1883\"\n",
            config_loader::ConfigFormat::Toml,
        )
        .unwrap();
        let args = run_args(&["--endpoint", "broker:1884", "--username", "reader"]);

        apply_overrides(&mut app, &args);
        assert_eq!(app.datasource.endpoint, "broker:1884");
        assert_eq!(app.datasource.username, "reader");
    }

    #[tokio::test]
    async fn test_missing_config_reported() {
        let args = run_args(&["--config", "/nonexistent/config.toml"]);
        let err = run_pipeline(&args).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CliError>(),
            Some(CliError::FileNotFound { .. })
        ));
    }
}

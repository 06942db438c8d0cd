//! Pipeline orchestrator - wires broker, datasource, sinks and replay.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use contracts::{AppConfig, DataQuery, MessageBroker, QueryDataRequest, STREAM_PATH};
use datasource::MqttDatasource;
use dispatcher::{ChannelSink, SinkHandle};
use ingestion::{InMemoryBroker, ReplayPublisher, ReplayStats};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::PipelineStats;
use crate::error::CliError;

const COLLECTOR_NAME: &str = "cli_collector";
const QUERY_REF_ID: &str = "A";
const DRAIN_POLL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub app: AppConfig,

    /// Raw query payload
    pub query: String,

    /// Maximum number of frames to collect (None = unlimited)
    pub max_frames: Option<u64>,

    /// Pipeline timeout (None = no timeout)
    pub timeout: Option<Duration>,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,

    pub replay_path: Option<PathBuf>,

    /// Replay speed multiplier (1.0 = recorded pacing)
    pub replay_speed: f64,

    pub replay_interval: Duration,

    /// Keep streaming after the replay is exhausted
    pub follow: bool,
}

pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run until `shutdown` fires, the timeout elapses, `max_frames` is
    /// reached or the replay is exhausted
    pub async fn run(self, shutdown: CancellationToken) -> Result<PipelineStats> {
        let start_time = Instant::now();
        let app = &self.config.app;

        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        let broker = Arc::new(connect_broker(app));
        let datasource = Arc::new(MqttDatasource::new(
            app.datasource.clone(),
            app.stream.clone(),
            broker.clone() as Arc<dyn MessageBroker>,
        ));

        let health = datasource.check_health();
        info!(status = ?health.status, message = %health.message, "Health check");

        let response = datasource.query_data(QueryDataRequest {
            queries: vec![DataQuery::new(QUERY_REF_ID, self.config.query.clone())],
        });
        if let Some(error) = response
            .responses
            .get(QUERY_REF_ID)
            .and_then(|r| r.error.clone())
        {
            return Err(CliError::query_rejected(error).into());
        }
        info!(
            topic = ?datasource.active_topic(),
            channel = %datasource.stream_channel(),
            "Query applied"
        );

        // Sinks
        if app.sinks.is_empty() {
            info!("No sinks configured - frames are only summarized");
        }
        let mut handles = dispatcher::create_sink_handles(&app.sinks, datasource.consumer_timeout())
            .await
            .map_err(CliError::from)
            .context("Failed to create sinks")?;
        let active_sinks = handles.len();

        let (collector, mut frames_rx) = ChannelSink::channel(COLLECTOR_NAME, app.stream.queue_capacity);
        handles.push(SinkHandle::spawn_with_timeout(
            collector,
            app.stream.queue_capacity,
            datasource.consumer_timeout(),
        ));

        // Stream
        let cancel = shutdown.child_token();
        let stream_task = {
            let datasource = Arc::clone(&datasource);
            let cancel = cancel.clone();
            tokio::spawn(async move { datasource.run_stream(STREAM_PATH, handles, cancel).await })
        };

        let replay_task = self.spawn_replay(broker, Arc::clone(&datasource), cancel.clone()).await?;

        info!(max_frames = ?self.config.max_frames, "Pipeline running");

        let mut stats = PipelineStats {
            active_sinks,
            ..Default::default()
        };
        let collect = collect_frames(&mut frames_rx, &mut stats, self.config.max_frames);
        match self.config.timeout {
            Some(timeout) => {
                if tokio::time::timeout(timeout, collect).await.is_err() {
                    warn!(timeout_secs = timeout.as_secs(), "Pipeline timed out");
                }
            }
            None => collect.await,
        }

        // Shutdown
        info!("Shutting down pipeline...");
        cancel.cancel();

        if let Some(task) = replay_task {
            match task.await {
                Ok(replay) => stats.replay = Some(replay),
                Err(e) => warn!(error = %e, "Replay task failed"),
            }
        }

        // Keep the collector draining so its worker never waits on a full channel
        let discard = async { while frames_rx.recv().await.is_some() {} };
        let (stream_result, ()) = tokio::join!(stream_task, discard);
        match stream_result {
            Ok(Ok(dispatch)) => stats.dispatch = dispatch,
            Ok(Err(e)) => return Err(CliError::from(e).into()),
            Err(e) => warn!(error = %e, "Stream task failed"),
        }

        stats.queue = datasource.queue_metrics();
        datasource.dispose();
        stats.duration = start_time.elapsed();

        info!(
            duration_secs = stats.duration.as_secs_f64(),
            fps = format!("{:.2}", stats.fps()),
            "Pipeline shutdown complete"
        );

        Ok(stats)
    }

    /// Publish the replay file, then stop the stream once the queue is
    /// drained unless `follow` is set
    async fn spawn_replay(
        &self,
        broker: Arc<InMemoryBroker>,
        datasource: Arc<MqttDatasource>,
        cancel: CancellationToken,
    ) -> Result<Option<JoinHandle<ReplayStats>>> {
        let Some(path) = self.config.replay_path.as_ref() else {
            return Ok(None);
        };

        let records = ingestion::load_records(path)
            .await
            .map_err(CliError::from)
            .with_context(|| format!("Failed to load replay file {}", path.display()))?;
        info!(path = %path.display(), records = records.len(), "Replay loaded");

        let publisher = ReplayPublisher::new(broker)
            .with_interval(self.config.replay_interval)
            .with_speed(self.config.replay_speed);
        let follow = self.config.follow;

        Ok(Some(tokio::spawn(async move {
            let stats = publisher.run(&records, cancel.clone()).await;
            info!(published = stats.published, deliveries = stats.deliveries, "Replay finished");

            if !follow {
                while datasource.pending_messages() > 0 && !cancel.is_cancelled() {
                    tokio::time::sleep(DRAIN_POLL).await;
                }
                debug!("internal queue drained, stopping stream");
                cancel.cancel();
            }
            stats
        })))
    }
}

/// Broker for the configured datasource
///
/// A failed connection is not fatal: the datasource reports an unhealthy
/// state and the run proceeds without input.
fn connect_broker(app: &AppConfig) -> InMemoryBroker {
    match InMemoryBroker::connect(&app.datasource) {
        Ok(broker) => {
            info!(endpoint = %broker.endpoint(), "Connected to broker");
            broker
        }
        Err(e) => {
            warn!(error = %e, "Broker connection failed");
            let broker = InMemoryBroker::new(app.datasource.broker_url());
            broker.set_connected(false);
            broker
        }
    }
}

async fn collect_frames(
    frames_rx: &mut mpsc::Receiver<contracts::Frame>,
    stats: &mut PipelineStats,
    max_frames: Option<u64>,
) {
    while let Some(frame) = frames_rx.recv().await {
        stats.record_frame(&frame, Utc::now());

        debug!(seq = frame.seq, columns = frame.columns.len(), "Frame received");

        if let Some(max) = max_frames {
            if stats.frames_received >= max {
                info!(frames = stats.frames_received, "Reached max frames limit");
                break;
            }
        }
    }
}

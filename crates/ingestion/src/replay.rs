//! JSONL replay onto an in-memory broker
//!
//! One record per line:
//! ```text
//! {"topic": "sensors/a", "payload": {"temp": 21.5}}
//! {"topic": "sensors/a", "payload": "raw text, published as-is", "delay_ms": 250}
//! ```
//! JSON payloads are published compact; string payloads are published as
//! their raw bytes (handy for malformed-message cases). Blank lines and
//! lines starting with `#` are skipped.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::broker::InMemoryBroker;
use crate::error::{IngestionError, Result};

/// Upper bound on a single pause, reached only by very slow speeds
const MAX_PAUSE: Duration = Duration::from_secs(24 * 60 * 60);

/// One replayed message
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReplayRecord {
    pub topic: String,
    pub payload: Value,
    /// Pause before this record, overrides the publisher interval
    #[serde(default)]
    pub delay_ms: Option<u64>,
}

impl ReplayRecord {
    pub fn payload_bytes(&self) -> Bytes {
        match &self.payload {
            Value::String(raw) => Bytes::copy_from_slice(raw.as_bytes()),
            other => Bytes::from(other.to_string()),
        }
    }
}

/// Parse JSONL content
///
/// # Errors
/// `ReplayParse` with the 1-based line number of the first bad line.
pub fn parse_records(content: &str) -> Result<Vec<ReplayRecord>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(idx, line)| {
            serde_json::from_str(line).map_err(|e| IngestionError::ReplayParse {
                line: idx + 1,
                message: e.to_string(),
            })
        })
        .collect()
}

/// Read and parse a JSONL file
pub async fn load_records(path: impl AsRef<Path>) -> Result<Vec<ReplayRecord>> {
    let content = tokio::fs::read_to_string(path.as_ref()).await?;
    parse_records(&content)
}

/// Replay counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Records published
    pub published: u64,
    /// Subscriber deliveries across all records
    pub deliveries: u64,
}

/// Publishes replay records onto a broker with pacing
pub struct ReplayPublisher {
    broker: Arc<InMemoryBroker>,
    interval: Duration,
    speed: f64,
}

impl ReplayPublisher {
    pub fn new(broker: Arc<InMemoryBroker>) -> Self {
        Self {
            broker,
            interval: Duration::ZERO,
            speed: 1.0,
        }
    }

    /// Default pause between records
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Playback speed multiplier; `0` or less disables pacing
    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    fn pause_for(&self, record: &ReplayRecord) -> Duration {
        if !self.speed.is_finite() || self.speed <= 0.0 {
            return Duration::ZERO;
        }
        let base = record
            .delay_ms
            .map(Duration::from_millis)
            .unwrap_or(self.interval);
        Duration::try_from_secs_f64(base.as_secs_f64() / self.speed)
            .map_or(MAX_PAUSE, |pause| pause.min(MAX_PAUSE))
    }

    /// Publish all records in order, stopping early on cancellation
    #[instrument(name = "replay_run", skip_all, fields(records = records.len()))]
    pub async fn run(&self, records: &[ReplayRecord], cancel: CancellationToken) -> ReplayStats {
        let mut stats = ReplayStats::default();

        for (idx, record) in records.iter().enumerate() {
            let pause = self.pause_for(record);
            if idx > 0 && !pause.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(pause) => {}
                }
            } else if cancel.is_cancelled() {
                break;
            }

            let deliveries = self.broker.publish(&record.topic, record.payload_bytes());
            stats.published += 1;
            stats.deliveries += deliveries as u64;
            debug!(topic = %record.topic, deliveries, "replayed record");
        }

        info!(
            published = stats.published,
            deliveries = stats.deliveries,
            "replay finished"
        );
        stats
    }
}

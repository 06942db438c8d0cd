//! Stream metrics
//!
//! Recording helpers for the `metrics` facade plus an in-memory aggregator
//! that summarizes the frames a consumer has seen.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use contracts::{ColumnValues, Frame};
use metrics::{counter, gauge, histogram};

/// Record one handled query
pub fn record_query(success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!("mqtt_stream_queries_total", "status" => status).increment(1);
}

/// Record the broker connectivity observed by a health check
pub fn record_health(connected: bool) {
    gauge!("mqtt_stream_broker_connected").set(if connected { 1.0 } else { 0.0 });
}

/// Record a delivered frame as seen by a consumer
pub fn record_frame_delivered(sink_name: &str, frame: &Frame) {
    counter!("mqtt_stream_frames_delivered_total", "sink" => sink_name.to_string()).increment(1);
    gauge!("mqtt_stream_last_seq", "sink" => sink_name.to_string()).set(frame.seq as f64);
}

/// Consumer counters at one point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerCounters {
    pub queue_len: usize,
    pub writes: u64,
    pub failures: u64,
    pub dropped: u64,
    pub timeouts: u64,
}

/// Export a consumer's counters as gauges
pub fn record_consumer_counters(sink_name: &str, counters: ConsumerCounters) {
    let sink = sink_name.to_string();
    gauge!("mqtt_stream_consumer_queue_len", "sink" => sink.clone()).set(counters.queue_len as f64);
    gauge!("mqtt_stream_consumer_writes", "sink" => sink.clone()).set(counters.writes as f64);
    gauge!("mqtt_stream_consumer_failures", "sink" => sink.clone()).set(counters.failures as f64);
    gauge!("mqtt_stream_consumer_dropped", "sink" => sink.clone()).set(counters.dropped as f64);
    gauge!("mqtt_stream_consumer_timeouts", "sink" => sink).set(counters.timeouts as f64);
}

/// Record the time between a frame's timestamp and its arrival at a consumer
pub fn record_frame_lag_ms(lag_ms: f64) {
    histogram!("mqtt_stream_frame_lag_ms").record(lag_ms);
}

/// Frame aggregator
///
/// Tracks per-column null counts, numeric value statistics and the lag
/// between the time column and the moment the frame was observed.
#[derive(Debug, Clone, Default)]
pub struct StreamMetricsAggregator {
    /// Frames observed
    pub total_frames: u64,

    /// Highest sequence number observed
    pub last_seq: u64,

    /// Frames whose sequence number was not exactly previous + 1
    pub seq_gaps: u64,

    /// Null cells per column
    pub null_counts: BTreeMap<String, u64>,

    /// Value statistics per numeric column
    pub value_stats: BTreeMap<String, RunningStats>,

    /// Lag statistics (ms)
    pub lag_stats: RunningStats,
}

impl StreamMetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one frame into the statistics
    pub fn update(&mut self, frame: &Frame, observed_at: DateTime<Utc>) {
        if self.total_frames > 0 && frame.seq != self.last_seq + 1 {
            self.seq_gaps += 1;
        }
        self.total_frames += 1;
        self.last_seq = frame.seq;

        for column in &frame.columns {
            match &column.values {
                ColumnValues::String(values) => {
                    let nulls = values.iter().filter(|v| v.is_none()).count() as u64;
                    *self.null_counts.entry(column.name.clone()).or_default() += nulls;
                }
                ColumnValues::Number(values) => {
                    let stats = self.value_stats.entry(column.name.clone()).or_default();
                    let mut nulls = 0;
                    for value in values {
                        match value {
                            Some(v) => stats.push(*v),
                            None => nulls += 1,
                        }
                    }
                    *self.null_counts.entry(column.name.clone()).or_default() += nulls;
                }
                ColumnValues::Time(values) => {
                    for ts in values {
                        let lag = (observed_at - *ts).num_microseconds().unwrap_or(i64::MAX);
                        let lag_ms = lag as f64 / 1000.0;
                        self.lag_stats.push(lag_ms);
                        record_frame_lag_ms(lag_ms);
                    }
                }
            }
        }
    }

    pub fn summary(&self) -> StreamSummary {
        StreamSummary {
            total_frames: self.total_frames,
            last_seq: self.last_seq,
            seq_gaps: self.seq_gaps,
            null_counts: self.null_counts.clone(),
            value_stats: self
                .value_stats
                .iter()
                .map(|(name, stats)| (name.clone(), StatsSummary::from(stats)))
                .collect(),
            lag_ms: StatsSummary::from(&self.lag_stats),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Aggregated report
#[derive(Debug, Clone, Default)]
pub struct StreamSummary {
    pub total_frames: u64,
    pub last_seq: u64,
    pub seq_gaps: u64,
    pub null_counts: BTreeMap<String, u64>,
    pub value_stats: BTreeMap<String, StatsSummary>,
    pub lag_ms: StatsSummary,
}

impl std::fmt::Display for StreamSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Stream Summary ===")?;
        writeln!(f, "Total frames: {}", self.total_frames)?;
        writeln!(f, "Last seq: {}", self.last_seq)?;
        writeln!(f, "Sequence gaps: {}", self.seq_gaps)?;
        writeln!(f, "Lag (ms): {}", self.lag_ms)?;

        if !self.value_stats.is_empty() {
            writeln!(f, "Numeric columns:")?;
            for (name, stats) in &self.value_stats {
                writeln!(f, "  {}: {}", name, stats)?;
            }
        }

        let nulls: Vec<_> = self.null_counts.iter().filter(|(_, n)| **n > 0).collect();
        if !nulls.is_empty() {
            writeln!(f, "Null cells:")?;
            for (name, count) in nulls {
                writeln!(f, "  {}: {}", name, count)?;
            }
        }

        Ok(())
    }
}

/// Statistics summary
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online statistics (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

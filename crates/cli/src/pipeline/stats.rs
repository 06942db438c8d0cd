//! Pipeline statistics and metrics.

use std::time::Duration;

use chrono::{DateTime, Utc};
use contracts::Frame;
use dispatcher::DispatchStats;
use ingestion::{QueueMetricsSnapshot, ReplayStats};
use observability::StreamMetricsAggregator;

/// Statistics from a pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Frames seen by the CLI collector
    pub frames_received: u64,

    /// Total duration of the pipeline run
    pub duration: Duration,

    /// Configured sinks (the collector excluded)
    pub active_sinks: usize,

    /// Counters returned by the dispatcher
    pub dispatch: DispatchStats,

    /// Internal queue counters at shutdown
    pub queue: QueueMetricsSnapshot,

    pub replay: Option<ReplayStats>,

    /// Frame statistics seen by the collector
    pub frame_metrics: StreamMetricsAggregator,
}

impl PipelineStats {
    pub fn record_frame(&mut self, frame: &Frame, observed_at: DateTime<Utc>) {
        self.frames_received += 1;
        self.frame_metrics.update(frame, observed_at);
        observability::record_frame_delivered("cli_collector", frame);
    }

    /// Frames per second throughput
    pub fn fps(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.frames_received as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Queue drop rate as percentage of received messages
    pub fn drop_rate(&self) -> f64 {
        if self.queue.received > 0 {
            (self.queue.dropped as f64 / self.queue.received as f64) * 100.0
        } else {
            0.0
        }
    }

    pub fn print_summary(&self) {
        println!("\n=== Pipeline Statistics ===\n");

        println!("Overview");
        println!("  Duration: {:.2}s", self.duration.as_secs_f64());
        println!("  Frames received: {}", self.frames_received);
        println!("  FPS: {:.2}", self.fps());
        println!("  Active sinks: {}", self.active_sinks);

        if let Some(replay) = self.replay {
            println!("\nReplay");
            println!("  Records published: {}", replay.published);
            println!("  Deliveries: {}", replay.deliveries);
        }

        println!("\nIngestion");
        println!("  Messages received: {}", self.queue.received);
        println!(
            "  Messages dropped: {} ({:.2}%)",
            self.queue.dropped,
            self.drop_rate()
        );

        println!("\nDispatcher");
        println!("  Messages processed: {}", self.dispatch.messages);
        println!("  Frames dispatched: {}", self.dispatch.frames);
        println!("  Decode errors: {}", self.dispatch.decode_errors);
        println!("  Absent fields: {}", self.dispatch.absent_fields);

        println!("\n{}", self.frame_metrics.summary());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::Column;

    #[test]
    fn test_rates() {
        let mut stats = PipelineStats {
            duration: Duration::from_secs(2),
            queue: QueueMetricsSnapshot {
                received: 10,
                dropped: 1,
                queue_len: 0,
            },
            ..Default::default()
        };

        let frame = Frame {
            seq: 1,
            columns: vec![Column::time(vec![Utc::now()])],
            ..Frame::new("response")
        };
        stats.record_frame(&frame, Utc::now());
        stats.record_frame(&frame, Utc::now());

        assert_eq!(stats.frames_received, 2);
        assert!((stats.fps() - 1.0).abs() < 1e-10);
        assert!((stats.drop_rate() - 10.0).abs() < 1e-10);
    }

    #[test]
    fn test_empty_rates() {
        let stats = PipelineStats::default();
        assert_eq!(stats.fps(), 0.0);
        assert_eq!(stats.drop_rate(), 0.0);
    }
}

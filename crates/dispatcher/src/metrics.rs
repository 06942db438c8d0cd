//! Per-consumer delivery counters
//!
//! Each [`SinkHandle`](crate::SinkHandle) owns one [`SinkMetrics`], shared with
//! its worker task. The dispatcher only ever reads them through
//! [`SinkMetrics::snapshot`].

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Result of one write attempt against a sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    Failed,
    TimedOut,
}

const NO_SEQ: u64 = u64::MAX;

#[derive(Debug)]
pub struct SinkMetrics {
    queue_len: AtomicUsize,
    written: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
    dropped: AtomicU64,
    /// Seq of the newest frame the sink accepted, `NO_SEQ` until the first write
    last_written_seq: AtomicU64,
    /// Summed duration of successful writes
    write_micros: AtomicU64,
}

impl Default for SinkMetrics {
    fn default() -> Self {
        Self {
            queue_len: AtomicUsize::new(0),
            written: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            timed_out: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            last_written_seq: AtomicU64::new(NO_SEQ),
            write_micros: AtomicU64::new(0),
        }
    }
}

impl SinkMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the depth of the consumer queue as last observed
    pub fn observe_queue(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
    }

    /// A frame was refused before reaching the worker
    pub fn record_drop(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Account for a finished write attempt on frame `seq`
    pub fn record_write(&self, seq: u64, outcome: WriteOutcome, elapsed: Duration) {
        match outcome {
            WriteOutcome::Written => {
                self.written.fetch_add(1, Ordering::Relaxed);
                self.write_micros
                    .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
                self.last_written_seq.store(seq, Ordering::Relaxed);
            }
            WriteOutcome::Failed => {
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
            WriteOutcome::TimedOut => {
                self.timed_out.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn failure_count(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let write_count = self.written.load(Ordering::Relaxed);
        let total_micros = self.write_micros.load(Ordering::Relaxed);
        let last_seq = match self.last_written_seq.load(Ordering::Relaxed) {
            NO_SEQ => None,
            seq => Some(seq),
        };

        MetricsSnapshot {
            queue_len: self.queue_len.load(Ordering::Relaxed),
            write_count,
            failure_count: self.failed.load(Ordering::Relaxed),
            dropped_count: self.dropped.load(Ordering::Relaxed),
            timeout_count: self.timed_out.load(Ordering::Relaxed),
            last_seq,
            mean_write_latency: total_micros
                .checked_div(write_count)
                .map(Duration::from_micros)
                .unwrap_or_default(),
        }
    }
}

/// Point-in-time copy of a consumer's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub queue_len: usize,
    pub write_count: u64,
    pub failure_count: u64,
    pub dropped_count: u64,
    pub timeout_count: u64,
    /// Newest frame seq the consumer wrote, if any
    pub last_seq: Option<u64>,
    pub mean_write_latency: Duration,
}

impl MetricsSnapshot {
    /// Frames that never reached the sink or were abandoned mid-write
    pub fn lost(&self) -> u64 {
        self.dropped_count + self.failure_count + self.timeout_count
    }

    /// Frames the consumer has been offered so far
    pub fn offered(&self) -> u64 {
        self.write_count + self.lost()
    }
}

//! SinkHandle - one consumer with an isolated queue and worker task
//!
//! The dispatcher only ever calls `try_send`, which never waits. The worker
//! bounds every write by a timeout, so a stalled consumer loses frames
//! instead of holding up anyone else.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

use contracts::{DataSink, Frame};

use crate::metrics::{SinkMetrics, WriteOutcome};

/// Write timeout used by [`SinkHandle::spawn`]
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(1000);

/// Handle to a running consumer worker
pub struct SinkHandle {
    name: String,
    tx: mpsc::Sender<Frame>,
    metrics: Arc<SinkMetrics>,
    worker_handle: JoinHandle<()>,
}

impl SinkHandle {
    /// Spawn a worker with the default write timeout
    pub fn spawn<S: DataSink + Send + 'static>(sink: S, queue_capacity: usize) -> Self {
        Self::spawn_with_timeout(sink, queue_capacity, DEFAULT_WRITE_TIMEOUT)
    }

    /// Spawn a worker whose writes are abandoned after `write_timeout`
    pub fn spawn_with_timeout<S: DataSink + Send + 'static>(
        sink: S,
        queue_capacity: usize,
        write_timeout: Duration,
    ) -> Self {
        let name = sink.name().to_string();
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let metrics = Arc::new(SinkMetrics::new());

        let worker_metrics = Arc::clone(&metrics);
        let worker_name = name.clone();

        let worker_handle = tokio::spawn(async move {
            sink_worker(sink, rx, worker_metrics, worker_name, write_timeout).await;
        });

        Self {
            name,
            tx,
            metrics,
            worker_handle,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.metrics
    }

    /// Whether the worker has stopped accepting frames
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Queue a frame without waiting
    ///
    /// Returns false if the queue is full (frame dropped) or the worker is gone.
    pub fn try_send(&self, frame: Frame) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => {
                self.metrics
                    .observe_queue(self.tx.max_capacity() - self.tx.capacity());
                true
            }
            Err(mpsc::error::TrySendError::Full(f)) => {
                self.metrics.record_drop();
                ::metrics::counter!("mqtt_stream_consumer_drops_total", "sink" => self.name.clone())
                    .increment(1);
                warn!(sink = %self.name, seq = f.seq, "Queue full, frame dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(f)) => {
                self.metrics.record_drop();
                error!(sink = %self.name, seq = f.seq, "Sink worker closed unexpectedly");
                false
            }
        }
    }

    /// Stop the worker after it drains its queue
    #[instrument(name = "sink_handle_shutdown", skip(self), fields(sink = %self.name))]
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.worker_handle.await {
            error!(sink = %self.name, error = ?e, "Worker task panicked");
        }
        debug!(sink = %self.name, "SinkHandle shutdown complete");
    }
}

#[instrument(
    name = "sink_worker_loop",
    skip(sink, rx, metrics, write_timeout),
    fields(sink = %name)
)]
async fn sink_worker<S: DataSink>(
    mut sink: S,
    mut rx: mpsc::Receiver<Frame>,
    metrics: Arc<SinkMetrics>,
    name: String,
    write_timeout: Duration,
) {
    debug!(sink = %name, "Sink worker started");

    while let Some(frame) = rx.recv().await {
        metrics.observe_queue(rx.len());

        let started = Instant::now();
        let outcome = match tokio::time::timeout(write_timeout, sink.write(&frame)).await {
            Ok(Ok(())) => WriteOutcome::Written,
            Ok(Err(e)) => {
                error!(sink = %name, seq = frame.seq, error = %e, "Write failed");
                WriteOutcome::Failed
            }
            Err(_) => {
                warn!(
                    sink = %name,
                    seq = frame.seq,
                    timeout_ms = write_timeout.as_millis() as u64,
                    "Write timed out, frame abandoned"
                );
                WriteOutcome::TimedOut
            }
        };
        metrics.record_write(frame.seq, outcome, started.elapsed());
    }

    if let Err(e) = sink.flush().await {
        error!(sink = %name, error = %e, "Flush failed on shutdown");
    }
    if let Err(e) = sink.close().await {
        error!(sink = %name, error = %e, "Close failed on shutdown");
    }

    debug!(sink = %name, "Sink worker stopped");
}

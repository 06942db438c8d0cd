//! Internal message queue
//!
//! Bounded many-producer / single-consumer queue between the broker
//! callback and the dispatcher loop. Pushing never blocks: when the queue
//! is full the configured `DropPolicy` decides which message is lost.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_channel::{bounded, Receiver, Sender, TrySendError};
use contracts::{DropPolicy, RawMessage, StreamSettings};
use tracing::{trace, warn};

/// Result of a push
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Queued without loss
    Enqueued,
    /// Queue full, the oldest queued message was evicted to make room
    EvictedOldest,
    /// Queue full, the incoming message was discarded
    Dropped,
    /// Queue closed, the message was discarded
    Closed,
}

/// Queue metrics
#[derive(Debug, Default)]
pub struct QueueMetrics {
    /// Total messages offered
    pub received: AtomicU64,

    /// Total messages lost to overflow (either policy)
    pub dropped: AtomicU64,

    /// Queue length after the last push
    pub queue_len: AtomicUsize,
}

impl QueueMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn update_queue_len(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> QueueMetricsSnapshot {
        QueueMetricsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            queue_len: self.queue_len.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueMetricsSnapshot {
    pub received: u64,
    pub dropped: u64,
    pub queue_len: usize,
}

/// Bounded queue with an explicit overflow policy
#[derive(Debug)]
pub struct MessageQueue {
    tx: Sender<RawMessage>,
    // Kept so DropOldest can pop from the producer side
    rx: Receiver<RawMessage>,
    policy: DropPolicy,
    metrics: Arc<QueueMetrics>,
}

impl MessageQueue {
    /// Create a queue
    ///
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize, policy: DropPolicy) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        Self {
            tx,
            rx,
            policy,
            metrics: Arc::new(QueueMetrics::new()),
        }
    }

    pub fn from_settings(settings: &StreamSettings) -> Self {
        Self::new(settings.queue_capacity, settings.drop_policy)
    }

    /// Offer a message without blocking
    pub fn push(&self, message: RawMessage) -> PushOutcome {
        self.metrics.record_received();
        metrics::counter!("mqtt_stream_messages_received_total").increment(1);

        let outcome = match self.tx.try_send(message) {
            Ok(()) => PushOutcome::Enqueued,
            Err(TrySendError::Full(message)) => {
                self.metrics.record_dropped();
                metrics::counter!(
                    "mqtt_stream_messages_dropped_total",
                    "policy" => policy_label(self.policy)
                )
                .increment(1);
                match self.policy {
                    DropPolicy::DropNewest => {
                        trace!(topic = %message.topic, "queue full, message dropped (newest)");
                        PushOutcome::Dropped
                    }
                    DropPolicy::DropOldest => self.evict_and_push(message),
                }
            }
            Err(TrySendError::Closed(message)) => {
                warn!(topic = %message.topic, "queue closed, message discarded");
                PushOutcome::Closed
            }
        };

        self.metrics.update_queue_len(self.tx.len());
        outcome
    }

    fn evict_and_push(&self, message: RawMessage) -> PushOutcome {
        if let Ok(evicted) = self.rx.try_recv() {
            trace!(topic = %evicted.topic, "queue full, message evicted (oldest)");
        }
        match self.tx.try_send(message) {
            Ok(()) => PushOutcome::EvictedOldest,
            // Another producer refilled the slot first
            Err(TrySendError::Full(message)) => {
                trace!(topic = %message.topic, "queue still full, message dropped");
                PushOutcome::Dropped
            }
            Err(TrySendError::Closed(_)) => PushOutcome::Closed,
        }
    }

    /// Consumer end of the queue
    pub fn receiver(&self) -> Receiver<RawMessage> {
        self.rx.clone()
    }

    /// Close the queue. Queued messages can still be drained.
    pub fn close(&self) -> bool {
        self.tx.close()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.tx.capacity().unwrap_or(1)
    }

    pub fn policy(&self) -> DropPolicy {
        self.policy
    }

    pub fn metrics(&self) -> Arc<QueueMetrics> {
        Arc::clone(&self.metrics)
    }
}

fn policy_label(policy: DropPolicy) -> &'static str {
    match policy {
        DropPolicy::DropOldest => "drop_oldest",
        DropPolicy::DropNewest => "drop_newest",
    }
}

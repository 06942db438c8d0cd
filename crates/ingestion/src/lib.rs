//! # Ingestion
//!
//! Inbound side of the stream.
//!
//! Responsibilities:
//! - Own the single broker subscription and switch it atomically (`retopic`)
//! - Route every received message into a bounded internal queue
//! - Apply the overflow policy when the dispatcher falls behind
//! - Provide an in-memory broker and a JSONL replay publisher
//!
//! ## Usage Example
//!
//! ```
//! use std::sync::Arc;
//! use contracts::DropPolicy;
//! use ingestion::{InMemoryBroker, MessageQueue, TopicSubscriptionManager};
//!
//! let broker = Arc::new(InMemoryBroker::new("localhost:1883"));
//! let queue = Arc::new(MessageQueue::new(1024, DropPolicy::DropOldest));
//! let manager = TopicSubscriptionManager::new(broker.clone(), queue.clone());
//!
//! manager.retopic("sensors/a").unwrap();
//! broker.publish("sensors/a", r#"{"temp": 21.5}"#);
//! assert_eq!(queue.len(), 1);
//! ```

mod broker;
mod error;
mod queue;
mod replay;
mod subscription;

pub use broker::InMemoryBroker;
pub use error::{IngestionError, Result};
pub use queue::{MessageQueue, PushOutcome, QueueMetrics, QueueMetricsSnapshot};
pub use replay::{load_records, parse_records, ReplayPublisher, ReplayRecord, ReplayStats};
pub use subscription::TopicSubscriptionManager;

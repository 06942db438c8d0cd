//! # Contracts
//!
//! Frozen interface contracts, defining inter-module data structures and traits.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Data Flow
//! `RawMessage` -> (decode + extract) `ExtractedRecord` -> (assemble) `Frame` -> `DataSink`
//!
//! ## Time Model
//! - Frames carry wall-clock UTC timestamps (`chrono::DateTime<Utc>`)
//! - `Frame::seq` is assigned by the dispatcher, used for ordering/diagnostics

mod broker;
mod config;
mod error;
mod field_spec;
mod frame;
mod message;
mod record;
mod sink;
mod stream;
mod topic;

pub use broker::{MessageBroker, MessageCallback, SubscriptionToken};
pub use config::*;
pub use error::*;
pub use field_spec::*;
pub use frame::*;
pub use message::RawMessage;
pub use record::*;
pub use sink::*;
pub use stream::*;
pub use topic::Topic;

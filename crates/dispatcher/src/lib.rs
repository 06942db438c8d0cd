//! # Dispatcher
//!
//! Stream delivery module.
//!
//! Responsibilities:
//! - Drain the internal message queue on a single loop
//! - Turn each message into a `Frame` (decode, extract, assemble)
//! - Fan out to every consumer
//! - Isolate slow consumers so they never stall the loop

pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod metrics;
pub mod sinks;

pub use contracts::{DataSink, Frame};
pub use dispatcher::{
    create_sink_handle, create_sink_handles, DispatchStats, DispatcherState, StreamDispatcher,
};
pub use error::DispatcherError;
pub use handle::{SinkHandle, DEFAULT_WRITE_TIMEOUT};
pub use metrics::{MetricsSnapshot, SinkMetrics, WriteOutcome};
pub use sinks::{ChannelSink, FileSink, LogSink, NetworkSink};

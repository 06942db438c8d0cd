//! Sink implementations
//!
//! Contains LogSink, FileSink, NetworkSink and ChannelSink.

mod channel;
mod file;
mod log;
mod network;

pub use self::channel::ChannelSink;
pub use self::file::{FileSink, FileSinkConfig};
pub use self::log::LogSink;
pub use self::network::{NetworkFormat, NetworkSink, NetworkSinkConfig};

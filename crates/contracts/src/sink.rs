//! Frame consumers
//!
//! Sinks are driven by a single worker task each, so methods take
//! `&mut self` and never need internal locking.

use crate::{ContractError, Frame};

/// A downstream recipient of frames
///
/// `DataSink` is the `Send` variant used by the dispatcher workers.
#[trait_variant::make(DataSink: Send)]
pub trait LocalDataSink {
    /// Label used in logs and per-consumer metrics
    fn name(&self) -> &str;

    /// Deliver one frame. An error loses this frame only; the worker
    /// moves on to the next one.
    async fn write(&mut self, frame: &Frame) -> Result<(), ContractError>;

    async fn flush(&mut self) -> Result<(), ContractError>;

    /// Release resources. Writes after `close` must fail.
    async fn close(&mut self) -> Result<(), ContractError>;
}

//! ChannelSink - forwards frames into an in-process channel
//!
//! The attachment point for host consumers: whoever holds the receiver
//! sees every frame the dispatcher hands to this sink. A receiver that
//! stops reading makes `write` wait, which the worker's write timeout
//! turns into a counted, logged drop.

use contracts::{ContractError, DataSink, Frame};
use tokio::sync::mpsc;
use tracing::{debug, instrument};

/// Sink backed by a tokio mpsc sender
pub struct ChannelSink {
    name: String,
    tx: Option<mpsc::Sender<Frame>>,
}

impl ChannelSink {
    pub fn new(name: impl Into<String>, tx: mpsc::Sender<Frame>) -> Self {
        Self {
            name: name.into(),
            tx: Some(tx),
        }
    }

    /// Sink plus the receiving end of a fresh channel
    pub fn channel(name: impl Into<String>, capacity: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(name, tx), rx)
    }
}

impl DataSink for ChannelSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "channel_sink_write",
        skip(self, frame),
        fields(sink = %self.name, seq = frame.seq)
    )]
    async fn write(&mut self, frame: &Frame) -> Result<(), ContractError> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| ContractError::sink_write(&self.name, "channel sink closed"))?;
        tx.send(frame.clone())
            .await
            .map_err(|_| ContractError::SinkConnection {
                sink_name: self.name.clone(),
                message: "receiver dropped".to_string(),
            })
    }

    #[instrument(name = "channel_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    #[instrument(name = "channel_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        self.tx = None;
        debug!(sink = %self.name, "ChannelSink closed");
        Ok(())
    }
}

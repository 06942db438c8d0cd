//! LogSink - logs frame summary via tracing

use contracts::{ColumnValues, ContractError, DataSink, Frame};
use tracing::{info, instrument};

/// Sink that logs frame summaries for debugging
pub struct LogSink {
    name: String,
}

impl LogSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn log_frame_summary(&self, frame: &Frame) {
        info!(
            sink = %self.name,
            seq = frame.seq,
            columns = frame.columns.len(),
            values = %summarize(frame),
            "Frame received"
        );
    }
}

/// `name=value` pairs of the first row
fn summarize(frame: &Frame) -> String {
    frame
        .columns
        .iter()
        .map(|column| {
            let value = match &column.values {
                ColumnValues::String(v) => v
                    .first()
                    .and_then(|s| s.clone())
                    .unwrap_or_else(|| "null".to_string()),
                ColumnValues::Number(v) => v
                    .first()
                    .copied()
                    .flatten()
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "null".to_string()),
                ColumnValues::Time(v) => v
                    .first()
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_default(),
            };
            format!("{}={}", column.name, value)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

impl DataSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_sink_write",
        skip(self, frame),
        fields(sink = %self.name, seq = frame.seq)
    )]
    async fn write(&mut self, frame: &Frame) -> Result<(), ContractError> {
        self.log_frame_summary(frame);
        Ok(())
    }

    #[instrument(name = "log_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        info!(sink = %self.name, "LogSink closed");
        Ok(())
    }
}

//! FileSink - appends frames to a JSON Lines file

use contracts::{ContractError, DataSink, Frame};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::{debug, error, instrument};

/// Configuration for FileSink
#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    /// Output file, parent directories are created
    pub path: PathBuf,
    /// Truncate instead of appending
    pub truncate: bool,
}

impl FileSinkConfig {
    /// Create config from params map (`path`, `truncate`)
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let path = params
            .get("path")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./output/frames.jsonl"));
        let truncate = params
            .get("truncate")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));

        Self { path, truncate }
    }
}

/// Sink that writes one JSON object per frame
pub struct FileSink {
    name: String,
    config: FileSinkConfig,
    writer: Option<BufWriter<File>>,
}

impl FileSink {
    pub fn new(name: impl Into<String>, config: FileSinkConfig) -> std::io::Result<Self> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(!config.truncate)
            .truncate(config.truncate)
            .open(&config.path)?;

        Ok(Self {
            name: name.into(),
            config,
            writer: Some(BufWriter::new(file)),
        })
    }

    /// Create from params map (for factory)
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> std::io::Result<Self> {
        Self::new(name, FileSinkConfig::from_params(params))
    }

    fn append_line(&mut self, frame: &Frame) -> std::io::Result<()> {
        let writer = self.writer.as_mut().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotConnected, "file sink closed")
        })?;
        serde_json::to_writer(&mut *writer, frame)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        writer.write_all(b"\n")
    }

    fn persist_frame(&mut self, frame: &Frame) -> Result<(), ContractError> {
        self.append_line(frame).map_err(|e| {
            error!(sink = %self.name, seq = frame.seq, error = %e, "Write failed");
            ContractError::sink_write(&self.name, e.to_string())
        })
    }
}

impl DataSink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "file_sink_write",
        skip(self, frame),
        fields(sink = %self.name, seq = frame.seq)
    )]
    async fn write(&mut self, frame: &Frame) -> Result<(), ContractError> {
        self.persist_frame(frame)
    }

    #[instrument(name = "file_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        if let Some(writer) = self.writer.as_mut() {
            writer
                .flush()
                .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))?;
        }
        Ok(())
    }

    #[instrument(name = "file_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        if let Some(mut writer) = self.writer.take() {
            writer
                .flush()
                .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))?;
        }
        debug!(sink = %self.name, path = %self.config.path.display(), "FileSink closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::Column;
    use tempfile::tempdir;

    fn frame(seq: u64) -> Frame {
        Frame {
            seq,
            columns: vec![Column::number("v", vec![Some(seq as f64)])],
            ..Frame::new("response")
        }
    }

    #[tokio::test]
    async fn test_file_sink_writes_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("frames.jsonl");
        let config = FileSinkConfig {
            path: path.clone(),
            truncate: false,
        };

        let mut sink = FileSink::new("test_file", config).unwrap();
        sink.write(&frame(1)).await.unwrap();
        sink.write(&frame(2)).await.unwrap();
        sink.close().await.unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["seq"], 1);
        assert_eq!(first["columns"][0]["name"], "v");
    }

    #[tokio::test]
    async fn test_file_sink_write_after_close_fails() {
        let dir = tempdir().unwrap();
        let mut params = HashMap::new();
        params.insert(
            "path".to_string(),
            dir.path().join("f.jsonl").display().to_string(),
        );

        let mut sink = FileSink::from_params("closed", &params).unwrap();
        sink.close().await.unwrap();
        assert!(sink.write(&frame(1)).await.is_err());
    }

    #[test]
    fn test_config_defaults() {
        let config = FileSinkConfig::from_params(&HashMap::new());
        assert_eq!(config.path, PathBuf::from("./output/frames.jsonl"));
        assert!(!config.truncate);
    }
}

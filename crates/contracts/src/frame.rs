//! Frame - Assembler output
//!
//! Columnar outbound unit handed to every consumer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ScalarType, TIME_ALIAS};

/// Name of the frame produced for streamed messages and query responses
pub const RESPONSE_FRAME_NAME: &str = "response";

/// Typed column storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnValues {
    /// Text column, `None` where the value was absent
    String(Vec<Option<String>>),
    /// Float column, `None` where the value was absent
    Number(Vec<Option<f64>>),
    /// Timestamp column, never absent
    Time(Vec<DateTime<Utc>>),
}

impl ColumnValues {
    pub fn len(&self) -> usize {
        match self {
            Self::String(v) => v.len(),
            Self::Number(v) => v.len(),
            Self::Time(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Scalar type this column was declared with (`None` for time columns)
    pub fn scalar_type(&self) -> Option<ScalarType> {
        match self {
            Self::String(_) => Some(ScalarType::String),
            Self::Number(_) => Some(ScalarType::Number),
            Self::Time(_) => None,
        }
    }
}

/// Named typed column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub values: ColumnValues,
}

impl Column {
    pub fn string(name: impl Into<String>, values: Vec<Option<String>>) -> Self {
        Self {
            name: name.into(),
            values: ColumnValues::String(values),
        }
    }

    pub fn number(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self {
            name: name.into(),
            values: ColumnValues::Number(values),
        }
    }

    pub fn time(values: Vec<DateTime<Utc>>) -> Self {
        Self {
            name: TIME_ALIAS.to_string(),
            values: ColumnValues::Time(values),
        }
    }

    pub fn is_time(&self) -> bool {
        matches!(self.values, ColumnValues::Time(_))
    }
}

/// Frame metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameMeta {
    /// Live channel address consumers attach to (`ds/{uid}/stream`)
    #[serde(default)]
    pub channel: Option<String>,
}

/// Outbound frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Frame name
    pub name: String,

    /// Sequence number assigned by the dispatcher (monotonically increasing)
    pub seq: u64,

    /// Columns in output order
    pub columns: Vec<Column>,

    /// Optional metadata, always written so positional encodings can decode it
    #[serde(default)]
    pub meta: Option<FrameMeta>,
}

impl Frame {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            seq: 0,
            columns: Vec::new(),
            meta: None,
        }
    }

    /// Empty frame pointing consumers at a live channel
    pub fn channel_reference(channel: impl Into<String>) -> Self {
        Self {
            meta: Some(FrameMeta {
                channel: Some(channel.into()),
            }),
            ..Self::new(RESPONSE_FRAME_NAME)
        }
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// The time column (first one, if the invariant was broken)
    pub fn time_column(&self) -> Option<&Column> {
        self.columns.iter().find(|c| c.is_time())
    }

    pub fn time_column_count(&self) -> usize {
        self.columns.iter().filter(|c| c.is_time()).count()
    }

    /// Number of rows (length of the first column)
    pub fn row_count(&self) -> usize {
        self.columns.first().map(|c| c.values.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_reference_frame() {
        let frame = Frame::channel_reference("ds/abc/stream");
        assert_eq!(frame.name, RESPONSE_FRAME_NAME);
        assert!(frame.columns.is_empty());
        assert_eq!(
            frame.meta.unwrap().channel.as_deref(),
            Some("ds/abc/stream")
        );
    }

    #[test]
    fn test_column_lookup() {
        let now = Utc::now();
        let frame = Frame {
            columns: vec![
                Column::number("temperature", vec![Some(21.5)]),
                Column::time(vec![now]),
            ],
            ..Frame::new(RESPONSE_FRAME_NAME)
        };

        assert_eq!(frame.row_count(), 1);
        assert_eq!(frame.time_column_count(), 1);
        assert_eq!(frame.time_column().unwrap().name, TIME_ALIAS);
        assert_eq!(
            frame.column("temperature").unwrap().values.scalar_type(),
            Some(ScalarType::Number)
        );
    }
}

//! ExtractedRecord - Extractor output
//!
//! One record per inbound message, consumed immediately by the assembler.

use serde::Serialize;

/// Extracted scalar
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ScalarValue {
    String(String),
    Number(f64),
    /// Path lookup or conversion failed
    Absent,
}

impl ScalarValue {
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }
}

/// Named value inside a record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordEntry {
    pub name: String,
    pub value: ScalarValue,
}

/// Ordered mapping from output name to extracted value.
///
/// Holds one entry per value rule of the `FieldSpecSet` it was extracted
/// with. The value located by the `time` rule, if the set has one, is kept
/// apart in [`ExtractedRecord::time`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractedRecord {
    entries: Vec<RecordEntry>,
    time: Option<ScalarValue>,
}

impl ExtractedRecord {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            time: None,
        }
    }

    pub fn push(&mut self, name: impl Into<String>, value: ScalarValue) {
        self.entries.push(RecordEntry {
            name: name.into(),
            value,
        });
    }

    pub fn set_time(&mut self, value: ScalarValue) {
        self.time = Some(value);
    }

    pub fn entries(&self) -> &[RecordEntry] {
        &self.entries
    }

    /// Value for an output name (`None` if the name is not in the record)
    pub fn get(&self, name: &str) -> Option<&ScalarValue> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| &e.value)
    }

    /// Value located by the time rule (`None` if the set had no time rule)
    pub fn time(&self) -> Option<&ScalarValue> {
        self.time.as_ref()
    }

    pub fn absent_count(&self) -> usize {
        self.entries.iter().filter(|e| e.value.is_absent()).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

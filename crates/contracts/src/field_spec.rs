//! FieldSpec / FieldSpecSet - extraction rules
//!
//! A `FieldSpecSet` is immutable once built. Configuration updates replace
//! the whole set, they never edit one in place.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{ContractError, Topic};

/// Output name reserved for the time column
pub const TIME_ALIAS: &str = "time";

/// Scalar type of an output column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    String,
    Number,
}

impl ScalarType {
    /// Parse the wire name (`"string"` / `"number"`)
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "string" => Some(Self::String),
            "number" => Some(Self::Number),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One extraction rule: path expression -> named, typed output column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Path expression evaluated against the decoded message
    pub path: String,

    /// Output column name, unique within a set
    pub output_name: String,

    /// Target scalar type
    pub scalar_type: ScalarType,
}

impl FieldSpec {
    pub fn new(
        path: impl Into<String>,
        output_name: impl Into<String>,
        scalar_type: ScalarType,
    ) -> Self {
        Self {
            path: path.into(),
            output_name: output_name.into(),
            scalar_type,
        }
    }

    /// Whether this rule supplies the time column
    pub fn is_time(&self) -> bool {
        self.output_name == TIME_ALIAS
    }
}

/// The ordered rule set currently in effect, plus the topic it was configured with
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FieldSpecSet {
    topic: Topic,
    specs: Vec<FieldSpec>,
}

impl FieldSpecSet {
    /// Build a rule set.
    ///
    /// # Errors
    /// Returns `ConfigValidation` if two rules share an output name. This
    /// covers the reserved `time` alias as well, so a valid set has at most
    /// one time rule.
    pub fn new(topic: impl Into<Topic>, specs: Vec<FieldSpec>) -> Result<Self, ContractError> {
        let mut seen = HashSet::new();
        for (idx, spec) in specs.iter().enumerate() {
            if !seen.insert(spec.output_name.as_str()) {
                return Err(ContractError::config_validation(
                    format!("jsonpathOptions[{idx}].alias"),
                    format!("duplicate alias '{}'", spec.output_name),
                ));
            }
        }

        Ok(Self {
            topic: topic.into(),
            specs,
        })
    }

    /// Set with no topic and no rules (initial registry state)
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// All rules, in configured order
    pub fn specs(&self) -> &[FieldSpec] {
        &self.specs
    }

    /// Position of the time rule, if any
    pub fn time_index(&self) -> Option<usize> {
        self.specs.iter().position(FieldSpec::is_time)
    }

    /// The time rule, if any
    pub fn time_spec(&self) -> Option<&FieldSpec> {
        self.specs.iter().find(|s| s.is_time())
    }

    /// Rules producing ordinary value columns, in configured order
    pub fn value_specs(&self) -> impl Iterator<Item = &FieldSpec> {
        self.specs.iter().filter(|s| !s.is_time())
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

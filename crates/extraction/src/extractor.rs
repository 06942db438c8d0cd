//! Path extractor
//!
//! Pure functions: decode a payload, then evaluate every rule of a
//! `FieldSpecSet` against the decoded tree. Per-field failures become
//! `ScalarValue::Absent`, so the record always has the shape of the set.

use contracts::{ExtractedRecord, FieldSpec, FieldSpecSet, ScalarType, ScalarValue};
use serde_json::Value;
use tracing::trace;

use crate::path;

/// Decode a message payload into a generic tree
pub fn decode(payload: &[u8]) -> Result<Value, serde_json::Error> {
    serde_json::from_slice(payload)
}

/// Extract one record from a decoded tree
///
/// Value rules land in the record in configured order. The rule aliased
/// `time`, if present, is stored with [`ExtractedRecord::set_time`].
pub fn extract(tree: &Value, specs: &FieldSpecSet) -> ExtractedRecord {
    let mut record = ExtractedRecord::with_capacity(specs.len());
    for spec in specs.specs() {
        let value = extract_field(tree, spec);
        if spec.is_time() {
            record.set_time(value);
        } else {
            record.push(spec.output_name.clone(), value);
        }
    }
    record
}

/// Evaluate a single rule
pub fn extract_field(tree: &Value, spec: &FieldSpec) -> ScalarValue {
    match path::lookup(tree, &spec.path) {
        Ok(found) => convert(&found, spec.scalar_type),
        Err(e) => {
            trace!(field = %spec.output_name, path = %spec.path, error = %e, "field absent");
            ScalarValue::Absent
        }
    }
}

/// Convert a located value to the target scalar type
pub fn convert(value: &Value, scalar_type: ScalarType) -> ScalarValue {
    match scalar_type {
        ScalarType::String => to_text(value),
        ScalarType::Number => to_number(value),
    }
}

/// Strings render as their contents, everything else as compact JSON
fn to_text(value: &Value) -> ScalarValue {
    match value {
        Value::String(s) => ScalarValue::String(s.clone()),
        other => ScalarValue::String(other.to_string()),
    }
}

fn to_number(value: &Value) -> ScalarValue {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(n) if n.is_finite() => ScalarValue::Number(n),
        _ => ScalarValue::Absent,
    }
}

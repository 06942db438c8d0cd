//! Record assembler
//!
//! Turns an `ExtractedRecord` into a single-row `Frame`: one typed column per
//! value rule, plus exactly one time column. The time column sits at the
//! position of the `time` rule when the set has one, otherwise it is
//! appended last and filled with `now`.

use chrono::{DateTime, NaiveDateTime, Utc};
use contracts::{
    Column, ExtractedRecord, FieldSpec, FieldSpecSet, Frame, ScalarType, ScalarValue,
    RESPONSE_FRAME_NAME,
};
use tracing::debug;

/// Epoch values at or above this magnitude are read as milliseconds
const EPOCH_MILLIS_THRESHOLD: f64 = 1e11;

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Build a frame from a record
pub fn assemble(record: &ExtractedRecord, specs: &FieldSpecSet, now: DateTime<Utc>) -> Frame {
    let mut columns = Vec::with_capacity(specs.len() + 1);
    let mut has_time = false;

    for spec in specs.specs() {
        if spec.is_time() {
            columns.push(Column::time(vec![resolve_time(record.time(), now)]));
            has_time = true;
        } else {
            let value = record
                .get(&spec.output_name)
                .unwrap_or(&ScalarValue::Absent);
            columns.push(value_column(spec, value));
        }
    }

    if !has_time {
        columns.push(Column::time(vec![now]));
    }

    Frame {
        columns,
        ..Frame::new(RESPONSE_FRAME_NAME)
    }
}

fn value_column(spec: &FieldSpec, value: &ScalarValue) -> Column {
    match spec.scalar_type {
        ScalarType::String => Column::string(
            spec.output_name.clone(),
            vec![value.as_str().map(str::to_owned)],
        ),
        ScalarType::Number => Column::number(spec.output_name.clone(), vec![value.as_f64()]),
    }
}

fn resolve_time(value: Option<&ScalarValue>, now: DateTime<Utc>) -> DateTime<Utc> {
    match value.and_then(parse_time) {
        Some(ts) => ts,
        None => {
            debug!(value = ?value, "time value unparseable, using current time");
            now
        }
    }
}

/// Interpret an extracted value as a timestamp
///
/// Accepts RFC 3339 strings, naive `YYYY-MM-DD HH:MM:SS[.f]` strings (read
/// as UTC) and Unix epochs given as numbers or numeric strings.
pub fn parse_time(value: &ScalarValue) -> Option<DateTime<Utc>> {
    match value {
        ScalarValue::Number(n) => from_epoch(*n),
        ScalarValue::String(s) => parse_time_str(s.trim()),
        ScalarValue::Absent => None,
    }
}

fn parse_time_str(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Some(naive) = NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
    {
        return Some(naive.and_utc());
    }
    s.parse::<f64>().ok().and_then(from_epoch)
}

fn from_epoch(value: f64) -> Option<DateTime<Utc>> {
    if !value.is_finite() {
        return None;
    }
    let millis = if value.abs() >= EPOCH_MILLIS_THRESHOLD {
        value
    } else {
        value * 1000.0
    };
    DateTime::from_timestamp_millis(millis.round() as i64)
}

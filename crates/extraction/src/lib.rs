//! # Extraction
//!
//! Turns raw message payloads into frames.
//!
//! ## Stages
//! - [`decode`]: payload bytes -> JSON tree
//! - [`extract`]: JSON tree + `FieldSpecSet` -> `ExtractedRecord`
//! - [`assemble`]: `ExtractedRecord` -> single-row `Frame`
//!
//! The rule set is read from a [`FieldSpecRegistry`], which hands out
//! immutable snapshots and is swapped wholesale on reconfiguration.
//!
//! ## Usage
//! ```
//! use chrono::Utc;
//! use contracts::{FieldSpec, FieldSpecSet, ScalarType};
//! use extraction::{assemble, decode, extract, FieldSpecRegistry};
//!
//! let registry = FieldSpecRegistry::with_set(
//!     FieldSpecSet::new(
//!         "sensors/a",
//!         vec![FieldSpec::new("$.temp", "temperature", ScalarType::Number)],
//!     )
//!     .unwrap(),
//! );
//!
//! let specs = registry.current();
//! let tree = decode(br#"{"temp": 21.5}"#).unwrap();
//! let frame = assemble(&extract(&tree, &specs), &specs, Utc::now());
//! assert_eq!(frame.columns.len(), 2);
//! ```

mod assembler;
mod error;
mod extractor;
mod path;
mod registry;

pub use assembler::{assemble, parse_time};
pub use error::{ExtractionError, Result};
pub use extractor::{convert, decode, extract, extract_field};
pub use path::{lookup, CompareOp, Filter, JsonPath, Operand, PathSegment};
pub use registry::FieldSpecRegistry;

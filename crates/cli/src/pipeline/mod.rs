//! Wiring for `mqtt-stream run`: broker, datasource, sinks and replay.

mod orchestrator;
mod stats;

pub use orchestrator::{Pipeline, PipelineConfig};
pub use stats::PipelineStats;

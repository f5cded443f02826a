//! Tracing targets, one per stage.
//!
//! Filter with e.g. `RUST_LOG=platewatch::validation=debug`.

pub const TRACING_TARGET_PIPELINE: &str = "platewatch::pipeline";
pub const TRACING_TARGET_INGESTION: &str = "platewatch::ingestion";
pub const TRACING_TARGET_VALIDATION: &str = "platewatch::validation";
pub const TRACING_TARGET_FEATURES: &str = "platewatch::features";
pub const TRACING_TARGET_TRAINER: &str = "platewatch::trainer";
pub const TRACING_TARGET_INFERENCE: &str = "platewatch::inference";

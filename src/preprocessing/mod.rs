//! Image preprocessing for OCR
//!
//! A validated [`PipelineConfig`](crate::config::PipelineConfig) drives the
//! stage executors in canonical order.

pub mod pipeline;
pub mod steps;

pub use pipeline::{run, ExecutionTrace, Pipeline, StageRecord};
pub use steps::StageOp;

//! Configurable image preprocessing for OCR engines.
//!
//! Named JSON profiles enable and parameterize a fixed sequence of stages
//! (color normalization, resize, grayscale, deskew, CLAHE, sharpen,
//! threshold, denoise, padding). Each profile is validated against the stage
//! registry when loaded, then run on images in canonical stage order.

pub mod batch;
pub mod config;
pub mod engine;
pub mod error;
pub mod preprocessing;
pub mod profiles;
pub mod raster;
pub mod registry;

pub use config::{PipelineConfig, StageSpec};
pub use error::{BatchError, ConfigError, Error, PipelineError, UnknownEngineError, ValidationError};
pub use preprocessing::{run, ExecutionTrace, Pipeline, StageRecord};
pub use profiles::ProfileResolver;
pub use raster::Image;
pub use registry::StageName;

use crate::registry::StageName;
use std::path::PathBuf;
use thiserror::Error;

/// A stage specification that does not satisfy the stage registry.
///
/// Always raised before any image is touched.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("unknown stage '{0}'")]
    UnknownStage(String),

    #[error("stage '{stage}': unknown method '{method}' (expected one of: {expected})")]
    UnknownMethod {
        stage: StageName,
        method: String,
        expected: String,
    },

    #[error("stage '{stage}': method '{method}' requires parameter '{param}'")]
    MissingParameter {
        stage: StageName,
        method: String,
        param: String,
    },

    #[error("stage '{stage}': method '{method}' does not accept parameter '{param}'")]
    UnknownParameter {
        stage: StageName,
        method: String,
        param: String,
    },

    #[error("stage '{stage}': parameter '{param}' must be {expected}, got {found}")]
    WrongType {
        stage: StageName,
        param: String,
        expected: &'static str,
        found: String,
    },

    #[error("stage '{stage}': parameter '{param}' = {value} is outside [{min}, {max}]")]
    OutOfRange {
        stage: StageName,
        param: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("stage '{stage}': parameter '{param}' = {value} must be odd")]
    NotOdd {
        stage: StageName,
        param: String,
        value: i64,
    },

    #[error("stage '{stage}': parameter '{param}' must be one of {allowed:?}, got '{found}'")]
    InvalidChoice {
        stage: StageName,
        param: String,
        allowed: &'static [&'static str],
        found: String,
    },

    #[error("stage '{stage}': method '{method}' requires stage '{requires}' to be enabled ({reason})")]
    Precondition {
        stage: StageName,
        method: String,
        requires: StageName,
        reason: &'static str,
    },
}

/// Failure to produce a `PipelineConfig` from a profile document.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to parse profile document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("stage '{stage}' is malformed: {source}")]
    MalformedStage {
        stage: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to read profile {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown profile '{0}'")]
    UnknownProfile(String),

    #[error("invalid profile: {0}")]
    Validation(#[from] ValidationError),
}

/// Runtime failure of a single pipeline run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("stage '{stage}' precondition violated: {precondition}")]
    Precondition {
        stage: StageName,
        precondition: &'static str,
    },

    #[error("stage '{stage}' failed: {message}")]
    Stage { stage: StageName, message: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown OCR engine '{0}' and no profile override supplied")]
pub struct UnknownEngineError(pub String);

/// Per-image failure inside the batch driver.
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("failed to load image {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to save image {path}: {source}")]
    Save {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("cancelled before processing started")]
    Cancelled,

    #[error("worker task failed: {0}")]
    Join(String),
}

/// Crate-level error for callers that drive several layers at once.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    UnknownEngine(#[from] UnknownEngineError),

    #[error("recognition failed: {0}")]
    Recognition(String),
}

impl From<ValidationError> for Error {
    fn from(err: ValidationError) -> Self {
        Error::Config(ConfigError::Validation(err))
    }
}

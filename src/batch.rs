//! Batch preprocessing of image files.
//!
//! Images are independent: each one is decoded, run through the shared
//! configuration and written out on the blocking pool, with at most `jobs`
//! in flight. Results come back in completion order.

use crate::config::PipelineConfig;
use crate::error::BatchError;
use crate::preprocessing::{self, ExecutionTrace};
use crate::raster::Image;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Where processed images are written as `<stem>.png`; nothing is
    /// written when unset
    pub output_dir: Option<PathBuf>,
    /// Maximum images processed concurrently
    pub jobs: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            output_dir: None,
            jobs: default_jobs(),
        }
    }
}

/// Available CPU cores, or 1 when unknown
pub fn default_jobs() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

#[derive(Debug)]
pub struct BatchOutcome {
    pub input: PathBuf,
    /// Path written, if the image was processed and saved
    pub output: Option<PathBuf>,
    pub result: Result<ExecutionTrace, BatchError>,
}

impl BatchOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Process every input with `config`.
///
/// Setting `cancel` stops images that have not started yet; they report
/// [`BatchError::Cancelled`]. An image already running always finishes.
#[instrument(skip_all, fields(profile = %config.name, images = inputs.len(), jobs = options.jobs))]
pub async fn run_batch(
    inputs: Vec<PathBuf>,
    config: Arc<PipelineConfig>,
    options: &BatchOptions,
    cancel: Arc<AtomicBool>,
) -> Vec<BatchOutcome> {
    let jobs = options.jobs.max(1);
    let output_dir = options.output_dir.clone();

    let outcomes: Vec<BatchOutcome> = stream::iter(inputs)
        .map(|input| {
            let config = Arc::clone(&config);
            let cancel = Arc::clone(&cancel);
            let output = output_dir.as_deref().map(|dir| output_path(dir, &input));
            async move {
                let task_input = input.clone();
                let task_output = output.clone();
                let result = tokio::task::spawn_blocking(move || {
                    process_one(&task_input, task_output.as_deref(), &config, &cancel)
                })
                .await
                .unwrap_or_else(|e| Err(BatchError::Join(e.to_string())));

                if let Err(e) = &result {
                    warn!(input = %input.display(), error = %e, "image failed");
                }
                BatchOutcome {
                    output: output.filter(|_| result.is_ok()),
                    input,
                    result,
                }
            }
        })
        .buffer_unordered(jobs)
        .collect()
        .await;

    let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
    info!(processed = outcomes.len() - failed, failed, "batch complete");
    outcomes
}

/// `<dir>/<input stem>.png`
pub fn output_path(dir: &Path, input: &Path) -> PathBuf {
    let stem = input.file_stem().unwrap_or(input.as_os_str());
    dir.join(format!("{}.png", stem.to_string_lossy()))
}

fn process_one(
    input: &Path,
    output: Option<&Path>,
    config: &PipelineConfig,
    cancel: &AtomicBool,
) -> Result<ExecutionTrace, BatchError> {
    if cancel.load(Ordering::SeqCst) {
        return Err(BatchError::Cancelled);
    }

    let decoded = image::open(input).map_err(|source| BatchError::Load {
        path: input.to_path_buf(),
        source,
    })?;
    let (processed, trace) = preprocessing::run(Image::from_dynamic(decoded), config)?;

    if let Some(path) = output {
        processed.into_dynamic().save(path).map_err(|source| BatchError::Save {
            path: path.to_path_buf(),
            source,
        })?;
    }
    Ok(trace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_path_uses_png_extension() {
        assert_eq!(
            output_path(Path::new("/out"), Path::new("/scans/page 1.jpeg")),
            PathBuf::from("/out/page 1.png")
        );
        assert_eq!(
            output_path(Path::new("out"), Path::new("receipt")),
            PathBuf::from("out/receipt.png")
        );
    }

    #[test]
    fn test_default_jobs_is_positive() {
        assert!(default_jobs() >= 1);
        assert!(BatchOptions::default().output_dir.is_none());
    }
}

use crate::config::{PipelineConfig, StageSpec};
use crate::error::PipelineError;
use crate::raster::Image;
use crate::registry::{self, Precondition, StageName};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument};

/// What one stage did during a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageRecord {
    pub stage: StageName,
    pub method: String,
    pub enabled: bool,
    /// Wall-clock cost in microseconds; zero for disabled stages
    pub elapsed_us: u64,
    /// Channel depth of the image leaving the stage
    pub channels: u8,
    pub width: u32,
    pub height: u32,
    /// Image is two-level (only 0 and 255)
    pub binary: bool,
}

/// Per-run record of every stage, in canonical order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionTrace {
    pub profile: String,
    pub total_us: u64,
    pub stages: Vec<StageRecord>,
}

impl ExecutionTrace {
    pub fn record(&self, stage: StageName) -> Option<&StageRecord> {
        self.stages.iter().find(|r| r.stage == stage)
    }

    pub fn executed(&self) -> impl Iterator<Item = &StageRecord> {
        self.stages.iter().filter(|r| r.enabled)
    }
}

/// Runs a shared configuration against any number of images
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: Arc<PipelineConfig>,
}

impl Pipeline {
    pub fn new(config: Arc<PipelineConfig>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn process(&self, image: Image) -> Result<(Image, ExecutionTrace), PipelineError> {
        run(image, &self.config)
    }
}

/// Apply every enabled stage of `config` to `image`, in canonical order.
///
/// Each stage sees only the previous stage's output. On error no partial
/// image is returned.
#[instrument(skip_all, fields(profile = %config.name, width = image.width(), height = image.height()))]
pub fn run(image: Image, config: &PipelineConfig) -> Result<(Image, ExecutionTrace), PipelineError> {
    let start = Instant::now();
    let mut records = Vec::with_capacity(config.stages().len());
    let mut binary = false;
    let mut img = image;

    for spec in config.stages() {
        if !spec.enabled {
            records.push(record(spec, &img, 0, binary));
            continue;
        }
        let step_start = Instant::now();
        img = run_step(spec, img)?;
        let elapsed_us = step_start.elapsed().as_micros() as u64;

        binary = match spec.stage {
            StageName::Threshold => true,
            _ if binary => is_two_level(&img),
            _ => false,
        };
        debug!(
            stage = %spec.stage,
            method = %spec.method,
            elapsed_us,
            channels = img.channels(),
            width = img.width(),
            height = img.height(),
            "stage complete"
        );
        records.push(record(spec, &img, elapsed_us, binary));
    }

    let trace = ExecutionTrace {
        profile: config.name.clone(),
        total_us: start.elapsed().as_micros() as u64,
        stages: records,
    };
    debug!(total_us = trace.total_us, executed = trace.executed().count(), "pipeline complete");
    Ok((img, trace))
}

fn run_step(spec: &StageSpec, img: Image) -> Result<Image, PipelineError> {
    let op = spec.op().ok_or_else(|| PipelineError::Stage {
        stage: spec.stage,
        message: format!("method '{}' is not bound", spec.method),
    })?;

    let precondition = registry::method_spec(spec.stage, &spec.method)
        .map(|m| m.precondition)
        .unwrap_or(Precondition::None);
    if precondition == Precondition::SingleChannel && img.channels() != 1 {
        return Err(PipelineError::Precondition {
            stage: spec.stage,
            precondition: precondition.describe(),
        });
    }

    op.apply(img)
}

fn record(spec: &StageSpec, img: &Image, elapsed_us: u64, binary: bool) -> StageRecord {
    StageRecord {
        stage: spec.stage,
        method: spec.method.clone(),
        enabled: spec.enabled,
        elapsed_us,
        channels: img.channels(),
        width: img.width(),
        height: img.height(),
        binary,
    }
}

fn is_two_level(img: &Image) -> bool {
    img.as_raw().iter().all(|&v| v == 0 || v == 255)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};
    use serde_json::json;

    fn config(doc: serde_json::Value) -> PipelineConfig {
        PipelineConfig::load(&doc.to_string()).unwrap()
    }

    #[test]
    fn test_disabled_config_is_identity() {
        let img = Image::Color(RgbImage::from_fn(7, 5, |x, y| Rgb([x as u8 * 30, y as u8 * 40, 77])));
        let (out, trace) = run(img.clone(), &PipelineConfig::disabled("off")).unwrap();

        assert_eq!(out, img);
        assert_eq!(trace.stages.len(), 9);
        assert!(trace.stages.iter().all(|r| !r.enabled && r.elapsed_us == 0));
    }

    #[test]
    fn test_trace_records_shape_changes() {
        let cfg = config(json!({
            "stages": {
                "padding": {"enabled": true, "size": 2},
                "grayscale": {"enabled": true}
            }
        }));
        let img = Image::Color(RgbImage::from_pixel(10, 4, Rgb([200, 100, 50])));
        let (out, trace) = run(img, &cfg).unwrap();

        assert_eq!(out.dimensions(), (14, 8));
        let gray = trace.record(StageName::Grayscale).unwrap();
        assert_eq!((gray.channels, gray.width, gray.height), (1, 10, 4));
        let padding = trace.record(StageName::Padding).unwrap();
        assert_eq!((padding.width, padding.height), (14, 8));
        assert!(!trace.record(StageName::Resize).unwrap().enabled);
    }

    #[test]
    fn test_threshold_marks_binary() {
        let cfg = config(json!({
            "stages": {
                "grayscale": {"enabled": true},
                "threshold": {"enabled": true, "method": "binary", "threshold": 100},
                "denoise": {"enabled": true, "method": "median"}
            }
        }));
        let img = Image::Gray(GrayImage::from_fn(12, 12, |x, _| Luma([(x * 20) as u8])));
        let (_, trace) = run(img, &cfg).unwrap();

        assert!(!trace.record(StageName::Grayscale).unwrap().binary);
        assert!(trace.record(StageName::Threshold).unwrap().binary);
        // Median of a two-level image stays two-level
        assert!(trace.record(StageName::Denoise).unwrap().binary);
    }

    #[test]
    fn test_runtime_precondition_guards_color_input() {
        let cfg = config(json!({
            "stages": {"grayscale": {"enabled": true}, "clahe": {"enabled": true}}
        }));
        // Feed color straight into clahe, skipping the grayscale stage
        let spec = cfg.stage(StageName::Clahe);

        let err = run_step(spec, Image::Color(RgbImage::new(8, 8))).unwrap_err();
        assert_eq!(
            err,
            PipelineError::Precondition {
                stage: StageName::Clahe,
                precondition: "input must be single-channel",
            }
        );
    }

    #[test]
    fn test_pipeline_shares_config() {
        let pipeline = Pipeline::new(Arc::new(PipelineConfig::disabled("off")));
        let img = Image::Gray(GrayImage::from_pixel(3, 3, Luma([42])));
        let (out, trace) = pipeline.process(img.clone()).unwrap();
        assert_eq!(out, img);
        assert_eq!(trace.profile, "off");
    }
}

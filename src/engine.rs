use crate::config::PipelineConfig;
use crate::error::Error;
use crate::preprocessing::{self, ExecutionTrace};
use crate::profiles::ProfileResolver;
use crate::raster::Image;
use std::path::Path;

/// Text recognized by an OCR engine
#[derive(Debug, Clone, PartialEq)]
pub struct OcrResult {
    pub text: String,
    pub confidence: f32,
}

/// An OCR engine consuming preprocessed images.
///
/// Engines live outside this crate; the processed [`Image`] is the whole
/// contract between them and the pipeline.
pub trait Recognizer: Send + Sync {
    /// Engine identifier used for profile resolution (e.g. "tesseract")
    fn name(&self) -> &str;

    fn recognize(&self, image: &Image) -> Result<OcrResult, Error>;
}

/// Result of [`recognize_with_profile`]
#[derive(Debug, Clone)]
pub struct Recognition {
    pub profile: String,
    pub result: OcrResult,
    pub trace: ExecutionTrace,
}

/// Resolve the recognizer's profile, preprocess `image` with it and hand the
/// output to the recognizer.
pub fn recognize_with_profile(
    recognizer: &dyn Recognizer,
    image: Image,
    resolver: &ProfileResolver,
    profile_override: Option<&str>,
    profile_dir: Option<&Path>,
) -> Result<Recognition, Error> {
    let profile = resolver.resolve(recognizer.name(), profile_override)?;
    let config = PipelineConfig::load_named(&profile, profile_dir)?;
    let (processed, trace) = preprocessing::run(image, &config)?;

    tracing::debug!(engine = recognizer.name(), profile = %profile, "handing image to recognizer");
    let result = recognizer.recognize(&processed)?;
    Ok(Recognition { profile, result, trace })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UnknownEngineError;
    use image::{Rgb, RgbImage};

    /// Reports what it was given instead of reading text
    struct Probe(&'static str);

    impl Recognizer for Probe {
        fn name(&self) -> &str {
            self.0
        }

        fn recognize(&self, image: &Image) -> Result<OcrResult, Error> {
            let (w, h) = image.dimensions();
            Ok(OcrResult {
                text: format!("{}x{}x{}", w, h, image.channels()),
                confidence: 1.0,
            })
        }
    }

    fn sample() -> Image {
        Image::Color(RgbImage::from_pixel(300, 100, Rgb([180, 170, 160])))
    }

    #[test]
    fn test_recognizer_receives_processed_image() {
        let recognition =
            recognize_with_profile(&Probe("paddleocr"), sample(), &ProfileResolver::default(), None, None).unwrap();
        assert_eq!(recognition.profile, "ppro-paddleocr");
        assert_eq!(recognition.result.text, "384x128x1");
    }

    #[test]
    fn test_override_selects_baseline() {
        let recognition = recognize_with_profile(
            &Probe("tesseract"),
            sample(),
            &ProfileResolver::default(),
            Some("ppro-none"),
            None,
        )
        .unwrap();
        assert_eq!(recognition.result.text, "300x100x3");
        assert_eq!(recognition.trace.executed().count(), 0);
    }

    #[test]
    fn test_unknown_engine_is_reported() {
        let err = recognize_with_profile(&Probe("bogus"), sample(), &ProfileResolver::default(), None, None)
            .unwrap_err();
        assert!(matches!(err, Error::UnknownEngine(UnknownEngineError(ref e)) if e == "bogus"));
    }
}

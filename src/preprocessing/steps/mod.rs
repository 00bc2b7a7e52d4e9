//! Individual preprocessing steps
//!
//! Each step module exposes a closed `Method` type built from validated
//! parameters and a pure `apply(Image, &Method)` transform.

pub mod clahe;
pub mod denoise;
pub mod deskew;
pub mod grayscale;
pub mod normalize;
pub mod padding;
pub mod resize;
pub mod sharpen;
pub mod threshold;

use crate::error::{PipelineError, ValidationError};
use crate::raster::Image;
use crate::registry::{self, Params, StageName};

/// A stage bound to its method and typed parameters
#[derive(Debug, Clone, PartialEq)]
pub enum StageOp {
    NormalizeColors(normalize::Method),
    Resize(resize::Method),
    Grayscale(grayscale::Method),
    Deskew(deskew::Method),
    Clahe(clahe::Method),
    Sharpen(sharpen::Method),
    Threshold(threshold::Method),
    Denoise(denoise::Method),
    Padding(padding::Method),
}

impl StageOp {
    /// Bind `(stage, method)` to its transform. `params` must come from
    /// [`registry::validate`] for the same pair.
    pub fn build(stage: StageName, method: &str, params: &Params) -> Result<Self, ValidationError> {
        Ok(match stage {
            StageName::NormalizeColors => Self::NormalizeColors(normalize::Method::from_params(method, params)?),
            StageName::Resize => Self::Resize(resize::Method::from_params(method, params)?),
            StageName::Grayscale => Self::Grayscale(grayscale::Method::from_params(method, params)?),
            StageName::Deskew => Self::Deskew(deskew::Method::from_params(method, params)?),
            StageName::Clahe => Self::Clahe(clahe::Method::from_params(method, params)?),
            StageName::Sharpen => Self::Sharpen(sharpen::Method::from_params(method, params)?),
            StageName::Threshold => Self::Threshold(threshold::Method::from_params(method, params)?),
            StageName::Denoise => Self::Denoise(denoise::Method::from_params(method, params)?),
            StageName::Padding => Self::Padding(padding::Method::from_params(method, params)?),
        })
    }

    pub fn stage(&self) -> StageName {
        match self {
            Self::NormalizeColors(_) => StageName::NormalizeColors,
            Self::Resize(_) => StageName::Resize,
            Self::Grayscale(_) => StageName::Grayscale,
            Self::Deskew(_) => StageName::Deskew,
            Self::Clahe(_) => StageName::Clahe,
            Self::Sharpen(_) => StageName::Sharpen,
            Self::Threshold(_) => StageName::Threshold,
            Self::Denoise(_) => StageName::Denoise,
            Self::Padding(_) => StageName::Padding,
        }
    }

    pub fn apply(&self, image: Image) -> Result<Image, PipelineError> {
        match self {
            Self::NormalizeColors(m) => normalize::apply(image, m),
            Self::Resize(m) => resize::apply(image, m),
            Self::Grayscale(m) => grayscale::apply(image, m),
            Self::Deskew(m) => deskew::apply(image, m),
            Self::Clahe(m) => clahe::apply(image, m),
            Self::Sharpen(m) => sharpen::apply(image, m),
            Self::Threshold(m) => threshold::apply(image, m),
            Self::Denoise(m) => denoise::apply(image, m),
            Self::Padding(m) => padding::apply(image, m),
        }
    }
}

pub(crate) fn unknown_method(stage: StageName, method: &str) -> ValidationError {
    ValidationError::UnknownMethod {
        stage,
        method: method.to_string(),
        expected: registry::methods_for(stage).join(", "),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    #[test]
    fn test_every_registered_method_builds_with_defaults() {
        for stage in StageName::CANONICAL {
            for spec in registry::methods(stage) {
                let mut raw = Map::new();
                if stage == StageName::Resize {
                    raw.insert("min_height".into(), 32.into());
                    raw.insert("min_width".into(), 32.into());
                }
                let params = registry::validate(stage, spec.name, &raw).unwrap();
                let op = StageOp::build(stage, spec.name, &params)
                    .unwrap_or_else(|e| panic!("{}/{}: {}", stage, spec.name, e));
                assert_eq!(op.stage(), stage);
            }
        }
    }
}

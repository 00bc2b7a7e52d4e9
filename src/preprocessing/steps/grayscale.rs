use crate::error::{PipelineError, ValidationError};
use crate::raster::Image;
use crate::registry::{Params, StageName};
use image::imageops;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Fixed luminance-weighted channel sum
    Luminance,
}

impl Method {
    pub fn from_params(method: &str, _params: &Params) -> Result<Self, ValidationError> {
        match method {
            "luminance" => Ok(Self::Luminance),
            other => Err(super::unknown_method(StageName::Grayscale, other)),
        }
    }
}

/// Convert image to grayscale
/// Later single-channel stages depend on this one being enabled
pub fn apply(image: Image, _method: &Method) -> Result<Image, PipelineError> {
    Ok(match image {
        Image::Gray(gray) => Image::Gray(gray),
        Image::Color(rgb) => Image::Gray(imageops::grayscale(&rgb)),
    })
}

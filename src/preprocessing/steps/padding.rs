use crate::error::{PipelineError, ValidationError};
use crate::raster::Image;
use crate::registry::{Params, StageName};
use image::{imageops, GrayImage, Luma, Rgb, RgbImage};

/// Uniform constant border
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Method {
    pub size: u32,
    /// Fill intensity for single-channel images
    pub value: u8,
    /// Fill color for three-channel images
    pub color: [u8; 3],
}

impl Method {
    pub fn from_params(method: &str, params: &Params) -> Result<Self, ValidationError> {
        if method != "constant" {
            return Err(super::unknown_method(StageName::Padding, method));
        }
        let to_u8 = |v: i64| v.clamp(0, 255) as u8;
        let value = to_u8(params.int("value")?);
        let channel = |name: &str| params.opt_int(name).map(to_u8).unwrap_or(value);
        Ok(Self {
            size: params.int("size")? as u32,
            value,
            color: [channel("red"), channel("green"), channel("blue")],
        })
    }
}

/// Add a border of `size` pixels on every side. Content is untouched.
pub fn apply(image: Image, method: &Method) -> Result<Image, PipelineError> {
    if method.size == 0 {
        return Ok(image);
    }
    let (width, height) = image.dimensions();
    let border = method.size;
    let (new_width, new_height) = match (
        width.checked_add(2 * border),
        height.checked_add(2 * border),
    ) {
        (Some(w), Some(h)) => (w, h),
        _ => {
            return Err(PipelineError::Stage {
                stage: StageName::Padding,
                message: format!("padded size of {}x{} overflows", width, height),
            })
        }
    };

    Ok(match image {
        Image::Gray(gray) => {
            let mut canvas = GrayImage::from_pixel(new_width, new_height, Luma([method.value]));
            imageops::replace(&mut canvas, &gray, border as i64, border as i64);
            Image::Gray(canvas)
        }
        Image::Color(rgb) => {
            let mut canvas = RgbImage::from_pixel(new_width, new_height, Rgb(method.color));
            imageops::replace(&mut canvas, &rgb, border as i64, border as i64);
            Image::Color(canvas)
        }
    })
}

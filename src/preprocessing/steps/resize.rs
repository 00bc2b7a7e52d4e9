use crate::error::{PipelineError, ValidationError};
use crate::raster::Image;
use crate::registry::{Params, StageName};
use image::imageops::{self, FilterType};

/// Largest output the stage will allocate
pub const MAX_OUTPUT_PIXELS: u64 = 100_000_000;

/// Resize interpolation and minimum target size
#[derive(Debug, Clone, PartialEq)]
pub struct Method {
    pub filter: FilterType,
    pub min_height: u32,
    pub min_width: u32,
    pub maintain_aspect: bool,
}

impl Method {
    pub fn from_params(method: &str, params: &Params) -> Result<Self, ValidationError> {
        let filter = match method {
            "nearest" => FilterType::Nearest,
            "linear" => FilterType::Triangle,
            "cubic" => FilterType::CatmullRom,
            "lanczos" => FilterType::Lanczos3,
            other => return Err(super::unknown_method(StageName::Resize, other)),
        };
        Ok(Self {
            filter,
            min_height: params.int("min_height")? as u32,
            min_width: params.int("min_width")? as u32,
            maintain_aspect: params.bool("maintain_aspect")?,
        })
    }

    /// Output dimensions for a `width x height` input.
    ///
    /// Only ever scales up. With `maintain_aspect` both sides share one scale
    /// factor, rounded up so neither side falls below its minimum.
    pub fn target_dimensions(&self, width: u32, height: u32) -> (u32, u32) {
        if !self.maintain_aspect {
            return (width.max(self.min_width), height.max(self.min_height));
        }

        let scale = (self.min_height as f64 / height as f64).max(self.min_width as f64 / width as f64);
        if scale <= 1.0 {
            return (width, height);
        }

        // Guard against 383.99999 style float error pushing ceil one pixel up
        let scaled = |side: u32| (side as f64 * scale - 1e-9).ceil() as u32;
        (
            scaled(width).max(self.min_width),
            scaled(height).max(self.min_height),
        )
    }
}

/// Scale the image up to at least the configured minimum size
pub fn apply(image: Image, method: &Method) -> Result<Image, PipelineError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(PipelineError::Stage {
            stage: StageName::Resize,
            message: "cannot resize an empty image".to_string(),
        });
    }

    let (new_width, new_height) = method.target_dimensions(width, height);
    if (new_width, new_height) == (width, height) {
        return Ok(image);
    }
    if new_width as u64 * new_height as u64 > MAX_OUTPUT_PIXELS {
        return Err(PipelineError::Stage {
            stage: StageName::Resize,
            message: format!(
                "{}x{} would be upscaled to {}x{}, more than {} pixels",
                width, height, new_width, new_height, MAX_OUTPUT_PIXELS
            ),
        });
    }

    tracing::debug!(
        from = ?(width, height),
        to = ?(new_width, new_height),
        "resizing image"
    );

    Ok(match image {
        Image::Gray(gray) => Image::Gray(imageops::resize(&gray, new_width, new_height, method.filter)),
        Image::Color(rgb) => Image::Color(imageops::resize(&rgb, new_width, new_height, method.filter)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, RgbImage};

    fn method(min_height: u32, min_width: u32, maintain_aspect: bool) -> Method {
        Method {
            filter: FilterType::CatmullRom,
            min_height,
            min_width,
            maintain_aspect,
        }
    }

    #[test]
    fn test_resize_upscales_small_image() {
        let img = GrayImage::new(100, 50);
        let result = apply(Image::Gray(img), &method(100, 100, true)).unwrap();
        assert_eq!(result.dimensions(), (200, 100));
    }

    #[test]
    fn test_resize_leaves_large_image_alone() {
        let img = GrayImage::new(400, 300);
        let result = apply(Image::Gray(img.clone()), &method(32, 32, true)).unwrap();
        assert_eq!(result, Image::Gray(img));
    }

    #[test]
    fn test_resize_never_below_minimums_and_keeps_aspect() {
        let m = method(48, 320, true);
        for (w, h) in [(300, 100), (7, 3), (1000, 20), (33, 47), (1, 1), (640, 47)] {
            let (nw, nh) = m.target_dimensions(w, h);
            assert!(nw >= 320 && nh >= 48, "{}x{} -> {}x{}", w, h, nw, nh);
            // Both sides come from one scale factor, off by less than a pixel
            let scale = (48.0 / h as f64).max(320.0 / w as f64);
            assert!((nw as f64 - w as f64 * scale).abs() < 1.0, "{}x{} -> {}x{}", w, h, nw, nh);
            assert!((nh as f64 - h as f64 * scale).abs() < 1.0, "{}x{} -> {}x{}", w, h, nw, nh);
        }
    }

    #[test]
    fn test_resize_refuses_oversized_output() {
        // 1x10000 scaled to width 10000 would need 10000 x 100000000 pixels
        let img = GrayImage::new(1, 10_000);
        let err = apply(Image::Gray(img), &method(1, 10_000, true)).unwrap_err();
        assert!(matches!(err, PipelineError::Stage { stage: StageName::Resize, .. }));
    }

    #[test]
    fn test_resize_without_aspect_raises_each_side() {
        let m = method(64, 10, false);
        assert_eq!(m.target_dimensions(300, 20), (300, 64));
    }

    #[test]
    fn test_resize_preserves_channel_depth() {
        let img = RgbImage::new(30, 10);
        let result = apply(Image::Color(img), &method(20, 20, true)).unwrap();
        assert_eq!(result.channels(), 3);
        assert_eq!(result.dimensions(), (60, 20));
    }

    #[test]
    fn test_resize_rejects_empty_image() {
        let img = GrayImage::new(0, 10);
        assert!(apply(Image::Gray(img), &method(20, 20, true)).is_err());
    }
}

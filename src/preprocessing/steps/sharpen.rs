use crate::error::{PipelineError, ValidationError};
use crate::raster::Image;
use crate::registry::{Params, StageName};
use image::{GrayImage, RgbImage};
use imageproc::filter::{filter3x3, gaussian_blur_f32};

/// Traditional 3x3 sharpening kernel: centre 9, all eight neighbours -1
const SHARPEN_KERNEL: [f32; 9] = [-1.0, -1.0, -1.0, -1.0, 9.0, -1.0, -1.0, -1.0, -1.0];

#[derive(Debug, Clone, PartialEq)]
pub enum Method {
    /// `src + strength * (src - gaussian(src, sigma))`
    UnsharpMask { strength: f32, sigma: f32 },
    /// Subtract `strength` times the 4-neighbour Laplacian
    Laplacian { strength: f32 },
    /// Fixed 3x3 kernel
    Kernel,
}

impl Method {
    pub fn from_params(method: &str, params: &Params) -> Result<Self, ValidationError> {
        match method {
            "unsharp_mask" => Ok(Self::UnsharpMask {
                strength: params.float("strength")? as f32,
                sigma: params.float("sigma")? as f32,
            }),
            "laplacian" => Ok(Self::Laplacian {
                strength: params.float("strength")? as f32,
            }),
            "kernel" => Ok(Self::Kernel),
            other => Err(super::unknown_method(StageName::Sharpen, other)),
        }
    }
}

/// Enhance edges to make text more distinct. Works on gray and color.
pub fn apply(image: Image, method: &Method) -> Result<Image, PipelineError> {
    Ok(match method {
        Method::UnsharpMask { strength, sigma } => unsharp_mask(image, *strength, *sigma),
        Method::Laplacian { strength } => {
            let s = *strength;
            // Identity plus scaled negative Laplacian
            let kernel = [0.0, -s, 0.0, -s, 1.0 + 4.0 * s, -s, 0.0, -s, 0.0];
            convolve(image, &kernel)
        }
        Method::Kernel => convolve(image, &SHARPEN_KERNEL),
    })
}

fn convolve(image: Image, kernel: &[f32; 9]) -> Image {
    match image {
        Image::Gray(gray) => {
            let out: GrayImage = filter3x3(&gray, kernel);
            Image::Gray(out)
        }
        Image::Color(rgb) => {
            let out: RgbImage = filter3x3(&rgb, kernel);
            Image::Color(out)
        }
    }
}

fn unsharp_mask(image: Image, strength: f32, sigma: f32) -> Image {
    if strength == 0.0 {
        return image;
    }
    match image {
        Image::Gray(mut gray) => {
            let blurred = gaussian_blur_f32(&gray, sigma);
            blend_detail(&mut gray, &blurred, strength);
            Image::Gray(gray)
        }
        Image::Color(mut rgb) => {
            let blurred = gaussian_blur_f32(&rgb, sigma);
            blend_detail(&mut rgb, &blurred, strength);
            Image::Color(rgb)
        }
    }
}

fn blend_detail<B>(samples: &mut B, blurred: &[u8], strength: f32)
where
    B: std::ops::DerefMut<Target = [u8]>,
{
    for (value, &blur) in samples.iter_mut().zip(blurred) {
        let v = *value as f32;
        *value = (v + strength * (v - blur as f32)).round().clamp(0.0, 255.0) as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    fn edge_image() -> GrayImage {
        // Left half dark, right half light
        GrayImage::from_fn(20, 10, |x, _| if x < 10 { Luma([50]) } else { Luma([200]) })
    }

    fn edge_contrast(image: &Image) -> i32 {
        let Image::Gray(gray) = image else {
            panic!("channel depth changed");
        };
        let left = gray.get_pixel(9, 5).0[0] as i32;
        let right = gray.get_pixel(10, 5).0[0] as i32;
        (right - left).abs()
    }

    #[test]
    fn test_sharpen_enhances_edges() {
        let original_diff = 200i32 - 50;
        for method in [
            Method::UnsharpMask { strength: 1.0, sigma: 1.0 },
            Method::Laplacian { strength: 1.0 },
            Method::Kernel,
        ] {
            let result = apply(Image::Gray(edge_image()), &method).unwrap();
            let result_diff = edge_contrast(&result);
            assert!(
                result_diff >= original_diff,
                "{:?}: edge should be enhanced: {} >= {}",
                method,
                result_diff,
                original_diff
            );
        }
    }

    #[test]
    fn test_sharpen_leaves_flat_regions_alone() {
        let img = GrayImage::from_pixel(12, 12, Luma([90]));
        for method in [
            Method::UnsharpMask { strength: 2.0, sigma: 1.5 },
            Method::Laplacian { strength: 1.0 },
            Method::Kernel,
        ] {
            let Image::Gray(out) = apply(Image::Gray(img.clone()), &method).unwrap() else {
                panic!("channel depth changed");
            };
            assert_eq!(out.get_pixel(6, 6).0[0], 90, "{:?}", method);
        }
    }

    #[test]
    fn test_sharpen_keeps_color() {
        let img = RgbImage::from_fn(10, 10, |x, _| if x < 5 { Rgb([20, 40, 60]) } else { Rgb([200, 180, 160]) });
        let result = apply(Image::Color(img), &Method::UnsharpMask { strength: 1.0, sigma: 1.0 }).unwrap();
        assert_eq!(result.channels(), 3);
        assert_eq!(result.dimensions(), (10, 10));
    }

    #[test]
    fn test_zero_strength_is_identity() {
        let img = edge_image();
        let result = apply(Image::Gray(img.clone()), &Method::UnsharpMask { strength: 0.0, sigma: 1.0 }).unwrap();
        assert_eq!(result, Image::Gray(img));
    }
}

use crate::error::{PipelineError, ValidationError};
use crate::raster::Image;
use crate::registry::{Params, Precondition, StageName};
use image::{GrayImage, Luma};
use imageproc::contrast::{otsu_level, threshold, ThresholdType};
use imageproc::filter::gaussian_blur_f32;

/// Sauvola dynamic range of the standard deviation (8-bit images)
const R: f32 = 128.0;

/// Binarization methods. Pixels above the threshold become 255, the rest 0.
#[derive(Debug, Clone, PartialEq)]
pub enum Method {
    /// Global threshold maximizing between-class variance
    Otsu,
    /// Gaussian-weighted neighbourhood mean minus `c`
    AdaptiveGaussian { block_size: u32, c: f32 },
    /// Plain neighbourhood mean minus `c`
    AdaptiveMean { block_size: u32, c: f32 },
    /// Fixed cutoff
    Binary { threshold: u8 },
    /// mean * (1 + k * (std_dev / R - 1)) over a `window_size` window
    Sauvola { window_size: u32, k: f32 },
}

impl Method {
    pub fn from_params(method: &str, params: &Params) -> Result<Self, ValidationError> {
        match method {
            "otsu" => Ok(Self::Otsu),
            "adaptive_gaussian" => Ok(Self::AdaptiveGaussian {
                block_size: params.int("block_size")? as u32,
                c: params.float("c")? as f32,
            }),
            "adaptive_mean" => Ok(Self::AdaptiveMean {
                block_size: params.int("block_size")? as u32,
                c: params.float("c")? as f32,
            }),
            "binary" => Ok(Self::Binary {
                threshold: params.int("threshold")?.clamp(0, 255) as u8,
            }),
            "sauvola" => Ok(Self::Sauvola {
                window_size: params.int("window_size")? as u32,
                k: params.float("k")? as f32,
            }),
            other => Err(super::unknown_method(StageName::Threshold, other)),
        }
    }
}

/// Binarize a single-channel image
pub fn apply(image: Image, method: &Method) -> Result<Image, PipelineError> {
    let gray = match image {
        Image::Gray(gray) => gray,
        Image::Color(_) => {
            return Err(PipelineError::Precondition {
                stage: StageName::Threshold,
                precondition: Precondition::SingleChannel.describe(),
            })
        }
    };

    let binarized = match method {
        Method::Otsu => {
            let level = otsu_level(&gray);
            tracing::debug!(level, "otsu threshold computed");
            threshold(&gray, level, ThresholdType::Binary)
        }
        Method::Binary { threshold: level } => threshold(&gray, *level, ThresholdType::Binary),
        Method::AdaptiveMean { block_size, c } => adaptive_mean_threshold(&gray, *block_size, *c),
        Method::AdaptiveGaussian { block_size, c } => adaptive_gaussian_threshold(&gray, *block_size, *c),
        Method::Sauvola { window_size, k } => sauvola_threshold(&gray, *window_size, *k),
    };
    Ok(Image::Gray(binarized))
}

fn adaptive_mean_threshold(img: &GrayImage, block_size: u32, c: f32) -> GrayImage {
    let (width, height) = img.dimensions();
    let half_window = block_size as i32 / 2;
    let (integral, integral_sq) = compute_integral_images(img);

    GrayImage::from_fn(width, height, |x, y| {
        let (x1, y1, x2, y2) = window_bounds(x, y, half_window, width, height);
        let (mean, _) = window_stats(&integral, &integral_sq, x1, y1, x2, y2);
        let pixel = img.get_pixel(x, y).0[0] as f32;
        if pixel > mean - c {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    })
}

fn adaptive_gaussian_threshold(img: &GrayImage, block_size: u32, c: f32) -> GrayImage {
    // Same sigma a block_size Gaussian kernel gets by default in OpenCV
    let sigma = (0.3 * ((block_size as f32 - 1.0) * 0.5 - 1.0) + 0.8).max(0.1);
    let weighted_mean = gaussian_blur_f32(img, sigma);

    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        let pixel = img.get_pixel(x, y).0[0] as f32;
        let threshold = weighted_mean.get_pixel(x, y).0[0] as f32 - c;
        if pixel > threshold {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    })
}

/// Sauvola adaptive thresholding
///
/// For each pixel, threshold = mean * (1 + k * (std_dev / R - 1))
/// where R is max standard deviation (128 for 8-bit images)
fn sauvola_threshold(img: &GrayImage, window_size: u32, k: f32) -> GrayImage {
    let (width, height) = img.dimensions();
    let half_window = window_size as i32 / 2;

    // Precompute integral images for efficient window statistics
    let (integral, integral_sq) = compute_integral_images(img);

    GrayImage::from_fn(width, height, |x, y| {
        let (x1, y1, x2, y2) = window_bounds(x, y, half_window, width, height);
        let (mean, std_dev) = window_stats(&integral, &integral_sq, x1, y1, x2, y2);

        let threshold = mean * (1.0 + k * (std_dev / R - 1.0));

        let pixel = img.get_pixel(x, y).0[0] as f32;
        if pixel > threshold {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    })
}

fn window_bounds(x: u32, y: u32, half_window: i32, width: u32, height: u32) -> (u32, u32, u32, u32) {
    let x1 = (x as i32 - half_window).max(0) as u32;
    let y1 = (y as i32 - half_window).max(0) as u32;
    let x2 = (x as i32 + half_window).min(width as i32 - 1) as u32;
    let y2 = (y as i32 + half_window).min(height as i32 - 1) as u32;
    (x1, y1, x2, y2)
}

/// Compute integral image and integral of squared values
fn compute_integral_images(img: &GrayImage) -> (Vec<Vec<f64>>, Vec<Vec<f64>>) {
    let (width, height) = img.dimensions();
    let mut integral = vec![vec![0.0f64; width as usize + 1]; height as usize + 1];
    let mut integral_sq = vec![vec![0.0f64; width as usize + 1]; height as usize + 1];

    for y in 0..height as usize {
        for x in 0..width as usize {
            let val = img.get_pixel(x as u32, y as u32).0[0] as f64;
            integral[y + 1][x + 1] = val + integral[y][x + 1] + integral[y + 1][x] - integral[y][x];
            integral_sq[y + 1][x + 1] =
                val * val + integral_sq[y][x + 1] + integral_sq[y + 1][x] - integral_sq[y][x];
        }
    }

    (integral, integral_sq)
}

/// Mean and standard deviation of an inclusive window using integral images
fn window_stats(
    integral: &[Vec<f64>],
    integral_sq: &[Vec<f64>],
    x1: u32,
    y1: u32,
    x2: u32,
    y2: u32,
) -> (f32, f32) {
    let (x1, y1, x2, y2) = (x1 as usize, y1 as usize, x2 as usize + 1, y2 as usize + 1);
    let area = ((x2 - x1) * (y2 - y1)) as f64;

    let sum = integral[y2][x2] - integral[y1][x2] - integral[y2][x1] + integral[y1][x1];
    let sum_sq = integral_sq[y2][x2] - integral_sq[y1][x2] - integral_sq[y2][x1] + integral_sq[y1][x1];

    let mean = sum / area;
    let variance = (sum_sq / area) - (mean * mean);
    let std_dev = variance.max(0.0).sqrt();

    (mean as f32, std_dev as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use std::collections::BTreeSet;

    fn all_methods() -> Vec<Method> {
        vec![
            Method::Otsu,
            Method::AdaptiveGaussian { block_size: 11, c: 2.0 },
            Method::AdaptiveMean { block_size: 11, c: 2.0 },
            Method::Binary { threshold: 127 },
            Method::Sauvola { window_size: 15, k: 0.2 },
        ]
    }

    fn distinct_values(img: &Image) -> BTreeSet<u8> {
        img.as_raw().iter().copied().collect()
    }

    #[test]
    fn test_threshold_binarizes_image() {
        // Simple gradient image
        let img = GrayImage::from_fn(50, 50, |x, _| Luma([(x as u8 * 5).min(255)]));

        for method in all_methods() {
            let result = apply(Image::Gray(img.clone()), &method).unwrap();
            for value in distinct_values(&result) {
                assert!(value == 0 || value == 255, "{:?}: non-binary pixel {}", method, value);
            }
        }
    }

    #[test]
    fn test_otsu_produces_exactly_two_levels() {
        let img = GrayImage::from_fn(40, 40, |x, y| Luma([((x * 3 + y * 2) % 256) as u8]));
        let result = apply(Image::Gray(img), &Method::Otsu).unwrap();
        assert_eq!(distinct_values(&result), BTreeSet::from([0, 255]));
    }

    #[test]
    fn test_threshold_handles_text_pattern() {
        // Dark text on light background
        let mut img = GrayImage::from_pixel(50, 20, Luma([240]));
        for x in 10..40 {
            img.put_pixel(x, 10, Luma([20]));
        }

        for method in all_methods() {
            let Image::Gray(out) = apply(Image::Gray(img.clone()), &method).unwrap() else {
                panic!("channel depth changed");
            };
            assert_eq!(out.get_pixel(25, 10).0[0], 0, "{:?}: text should be black", method);
            assert_eq!(out.get_pixel(25, 5).0[0], 255, "{:?}: background should be white", method);
        }
    }

    #[test]
    fn test_binary_cutoff_value_maps_to_black() {
        let img = GrayImage::from_fn(3, 1, |x, _| Luma([99 + x as u8]));
        let Image::Gray(out) = apply(Image::Gray(img), &Method::Binary { threshold: 100 }).unwrap() else {
            panic!("channel depth changed");
        };
        let values: Vec<u8> = out.pixels().map(|p| p.0[0]).collect();
        assert_eq!(values, vec![0, 0, 255]);
    }

    #[test]
    fn test_threshold_rejects_color_input() {
        let err = apply(Image::Color(RgbImage::new(4, 4)), &Method::Otsu).unwrap_err();
        assert!(matches!(err, PipelineError::Precondition { stage: StageName::Threshold, .. }));
    }
}

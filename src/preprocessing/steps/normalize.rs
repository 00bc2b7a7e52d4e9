use crate::error::{PipelineError, ValidationError};
use crate::raster::Image;
use crate::registry::{Params, StageName};
use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::contrast::equalize_histogram;

/// Global color balance methods
#[derive(Debug, Clone, PartialEq)]
pub enum Method {
    /// Stretch each channel so the given low/high percentiles map to 0/255
    SimpleWhiteBalance { percentile: f64 },
    /// Scale channels so their means converge on the global mean
    GrayWorld,
    /// Equalize the luminance only (`per_channel == false`) or every channel
    HistogramEqualization { per_channel: bool },
}

impl Method {
    pub fn from_params(method: &str, params: &Params) -> Result<Self, ValidationError> {
        match method {
            "simple_white_balance" => Ok(Self::SimpleWhiteBalance {
                percentile: params.float("percentile")?,
            }),
            "gray_world" => Ok(Self::GrayWorld),
            "histogram_equalization" => Ok(Self::HistogramEqualization {
                per_channel: params.text("mode")? == "per_channel",
            }),
            other => Err(super::unknown_method(StageName::NormalizeColors, other)),
        }
    }
}

/// Adjust global color balance. Channel depth is preserved.
pub fn apply(image: Image, method: &Method) -> Result<Image, PipelineError> {
    match method {
        Method::SimpleWhiteBalance { percentile } => {
            let luts: Vec<[u8; 256]> = channel_histograms(image.as_raw(), image.channels() as usize)
                .iter()
                .map(|hist| stretch_lut(hist, *percentile))
                .collect();
            Ok(apply_luts(image, &luts))
        }
        Method::GrayWorld => Ok(gray_world(image)),
        Method::HistogramEqualization { per_channel } => Ok(match image {
            Image::Gray(gray) => Image::Gray(equalize_histogram(&gray)),
            Image::Color(rgb) if *per_channel => {
                let luts: Vec<[u8; 256]> = channel_histograms(rgb.as_raw(), 3)
                    .iter()
                    .map(equalize_lut)
                    .collect();
                apply_luts(Image::Color(rgb), &luts)
            }
            Image::Color(rgb) => Image::Color(equalize_luminance(&rgb)),
        }),
    }
}

fn channel_histograms(raw: &[u8], channels: usize) -> Vec<[u32; 256]> {
    let mut histograms = vec![[0u32; 256]; channels];
    for pixel in raw.chunks_exact(channels) {
        for (c, value) in pixel.iter().enumerate() {
            histograms[c][*value as usize] += 1;
        }
    }
    histograms
}

fn apply_luts(image: Image, luts: &[[u8; 256]]) -> Image {
    match image {
        Image::Gray(mut gray) => {
            for value in gray.iter_mut() {
                *value = luts[0][*value as usize];
            }
            Image::Gray(gray)
        }
        Image::Color(mut rgb) => {
            for pixel in rgb.chunks_exact_mut(3) {
                for (c, value) in pixel.iter_mut().enumerate() {
                    *value = luts[c][*value as usize];
                }
            }
            Image::Color(rgb)
        }
    }
}

/// Value at which the cumulative count first reaches `fraction` of the total
fn percentile_value(hist: &[u32; 256], fraction: f64) -> u8 {
    let total: u64 = hist.iter().map(|&c| c as u64).sum();
    let target = (total as f64 * fraction).max(1.0);
    let mut cumulative = 0u64;
    for (value, &count) in hist.iter().enumerate() {
        cumulative += count as u64;
        if cumulative as f64 >= target {
            return value as u8;
        }
    }
    255
}

/// Linear stretch mapping the `percentile` / `100 - percentile` values to 0..255.
/// A flat channel maps to itself.
fn stretch_lut(hist: &[u32; 256], percentile: f64) -> [u8; 256] {
    let low = percentile_value(hist, percentile / 100.0);
    let high = percentile_value(hist, 1.0 - percentile / 100.0);

    let mut lut = [0u8; 256];
    for (value, out) in lut.iter_mut().enumerate() {
        *out = if high <= low {
            value as u8
        } else {
            let scaled = (value as f32 - low as f32) / (high - low) as f32 * 255.0;
            scaled.round().clamp(0.0, 255.0) as u8
        };
    }
    lut
}

fn equalize_lut(hist: &[u32; 256]) -> [u8; 256] {
    let total: u64 = hist.iter().map(|&c| c as u64).sum();
    let cdf_min = hist.iter().find(|&&c| c > 0).copied().unwrap_or(0) as u64;

    let mut lut = [0u8; 256];
    let mut cumulative = 0u64;
    for (value, out) in lut.iter_mut().enumerate() {
        cumulative += hist[value] as u64;
        *out = if total <= cdf_min {
            value as u8
        } else {
            let scaled = cumulative.saturating_sub(cdf_min) as f64 / (total - cdf_min) as f64 * 255.0;
            scaled.round().clamp(0.0, 255.0) as u8
        };
    }
    lut
}

fn gray_world(image: Image) -> Image {
    let rgb = match image {
        // A single channel already equals its own mean
        Image::Gray(gray) => return Image::Gray(gray),
        Image::Color(rgb) => rgb,
    };

    let pixel_count = (rgb.width() as f64 * rgb.height() as f64).max(1.0);
    let mut sums = [0f64; 3];
    for pixel in rgb.pixels() {
        for (c, sum) in sums.iter_mut().enumerate() {
            *sum += pixel.0[c] as f64;
        }
    }
    let means = sums.map(|s| s / pixel_count);
    let gray_mean = means.iter().sum::<f64>() / 3.0;

    let mut luts = [[0u8; 256]; 3];
    for (c, lut) in luts.iter_mut().enumerate() {
        let gain = if means[c] > 0.0 { gray_mean / means[c] } else { 1.0 };
        for (value, out) in lut.iter_mut().enumerate() {
            *out = (value as f64 * gain).round().clamp(0.0, 255.0) as u8;
        }
    }
    apply_luts(Image::Color(rgb), &luts)
}

/// Equalize Y of a full-range BT.601 YCbCr decomposition, leaving chroma alone.
fn equalize_luminance(rgb: &RgbImage) -> RgbImage {
    let (width, height) = rgb.dimensions();
    let luma = GrayImage::from_fn(width, height, |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        Luma([(0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32).round() as u8])
    });
    let equalized = equalize_histogram(&luma);

    RgbImage::from_fn(width, height, |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0.map(|v| v as f32);
        let cb = -0.168_736 * r - 0.331_264 * g + 0.5 * b;
        let cr = 0.5 * r - 0.418_688 * g - 0.081_312 * b;
        let y_new = equalized.get_pixel(x, y).0[0] as f32;

        let to_u8 = |v: f32| v.round().clamp(0.0, 255.0) as u8;
        Rgb([
            to_u8(y_new + 1.402 * cr),
            to_u8(y_new - 0.344_136 * cb - 0.714_136 * cr),
            to_u8(y_new + 1.772 * cb),
        ])
    })
}

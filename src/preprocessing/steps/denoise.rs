use crate::error::{PipelineError, ValidationError};
use crate::raster::Image;
use crate::registry::{Params, Precondition, StageName};
use image::{GrayImage, ImageBuffer, Pixel};
use imageproc::distance_transform::Norm;
use imageproc::filter::{gaussian_blur_f32, median_filter};
use imageproc::morphology::{close, open};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Morphology {
    /// Erode then dilate: removes bright specks
    Open,
    /// Dilate then erode: fills dark specks
    Close,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Method {
    /// Edge-preserving weighted average over a `diameter` window
    Bilateral {
        diameter: u32,
        sigma_color: f32,
        sigma_space: f32,
    },
    Gaussian { sigma: f32 },
    /// Best for salt-and-pepper noise
    Median { radius: u32 },
    Morphological { operation: Morphology, radius: u8 },
    /// Patch-similarity weighted average; slowest, best quality
    NonLocalMeans {
        h: f32,
        template_window: u32,
        search_window: u32,
    },
}

impl Method {
    pub fn from_params(method: &str, params: &Params) -> Result<Self, ValidationError> {
        match method {
            "bilateral" => Ok(Self::Bilateral {
                diameter: params.int("diameter")? as u32,
                sigma_color: params.float("sigma_color")? as f32,
                sigma_space: params.float("sigma_space")? as f32,
            }),
            "gaussian" => Ok(Self::Gaussian {
                sigma: params.float("sigma")? as f32,
            }),
            "median" => Ok(Self::Median {
                radius: params.int("radius")? as u32,
            }),
            "morphological" => Ok(Self::Morphological {
                operation: match params.text("operation")? {
                    "close" => Morphology::Close,
                    _ => Morphology::Open,
                },
                radius: params.int("radius")?.clamp(1, u8::MAX as i64) as u8,
            }),
            "non_local_means" => Ok(Self::NonLocalMeans {
                h: params.float("h")? as f32,
                template_window: params.int("template_window")? as u32,
                search_window: params.int("search_window")? as u32,
            }),
            other => Err(super::unknown_method(StageName::Denoise, other)),
        }
    }
}

/// Reduce noise. Bilateral, Gaussian and median work on any channel depth;
/// morphology and non-local means need single-channel input.
pub fn apply(image: Image, method: &Method) -> Result<Image, PipelineError> {
    match method {
        Method::Bilateral {
            diameter,
            sigma_color,
            sigma_space,
        } => match image {
            Image::Gray(gray) => Ok(Image::Gray(bilateral(&gray, *diameter, *sigma_color, *sigma_space)?)),
            Image::Color(rgb) => Ok(Image::Color(bilateral(&rgb, *diameter, *sigma_color, *sigma_space)?)),
        },
        Method::Gaussian { sigma } => Ok(match image {
            Image::Gray(gray) => Image::Gray(gaussian_blur_f32(&gray, *sigma)),
            Image::Color(rgb) => Image::Color(gaussian_blur_f32(&rgb, *sigma)),
        }),
        Method::Median { radius } => Ok(match image {
            Image::Gray(gray) => Image::Gray(median_filter(&gray, *radius, *radius)),
            Image::Color(rgb) => Image::Color(median_filter(&rgb, *radius, *radius)),
        }),
        Method::Morphological { operation, radius } => {
            let gray = single_channel(image)?;
            Ok(Image::Gray(match operation {
                Morphology::Open => open(&gray, Norm::LInf, *radius),
                Morphology::Close => close(&gray, Norm::LInf, *radius),
            }))
        }
        Method::NonLocalMeans {
            h,
            template_window,
            search_window,
        } => {
            let gray = single_channel(image)?;
            Ok(Image::Gray(non_local_means(
                &gray,
                *h,
                *template_window / 2,
                *search_window / 2,
            )))
        }
    }
}

fn single_channel(image: Image) -> Result<GrayImage, PipelineError> {
    match image {
        Image::Gray(gray) => Ok(gray),
        Image::Color(_) => Err(PipelineError::Precondition {
            stage: StageName::Denoise,
            precondition: Precondition::SingleChannel.describe(),
        }),
    }
}

/// Bilateral filter over raw interleaved samples; the range distance is the
/// sum of absolute channel differences.
fn bilateral<P>(
    img: &ImageBuffer<P, Vec<u8>>,
    diameter: u32,
    sigma_color: f32,
    sigma_space: f32,
) -> Result<ImageBuffer<P, Vec<u8>>, PipelineError>
where
    P: Pixel<Subpixel = u8>,
{
    let (width, height) = img.dimensions();
    let channels = P::CHANNEL_COUNT as usize;
    let radius = (diameter / 2) as i64;
    let src = img.as_raw();

    let space_coeff = -0.5 / (sigma_space * sigma_space);
    let color_coeff = -0.5 / (sigma_color * sigma_color);
    let color_weights: Vec<f32> = (0..=255 * channels)
        .map(|d| ((d * d) as f32 * color_coeff).exp())
        .collect();

    let mut out = vec![0u8; src.len()];
    let index = |x: i64, y: i64| (y as usize * width as usize + x as usize) * channels;

    for y in 0..height as i64 {
        for x in 0..width as i64 {
            let centre = &src[index(x, y)..index(x, y) + channels];
            let mut sums = [0f32; 4];
            let mut weight_sum = 0f32;

            for dy in -radius..=radius {
                for dx in -radius..=radius {
                    let r2 = (dx * dx + dy * dy) as f32;
                    if r2 > (radius * radius) as f32 {
                        continue;
                    }
                    let nx = (x + dx).clamp(0, width as i64 - 1);
                    let ny = (y + dy).clamp(0, height as i64 - 1);
                    let neighbour = &src[index(nx, ny)..index(nx, ny) + channels];

                    let distance: usize = centre
                        .iter()
                        .zip(neighbour)
                        .map(|(&a, &b)| (a as i32 - b as i32).unsigned_abs() as usize)
                        .sum();
                    let weight = (r2 * space_coeff).exp() * color_weights[distance];

                    for (c, &v) in neighbour.iter().enumerate() {
                        sums[c] += weight * v as f32;
                    }
                    weight_sum += weight;
                }
            }

            let base = index(x, y);
            for c in 0..channels {
                out[base + c] = (sums[c] / weight_sum).round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    ImageBuffer::from_raw(width, height, out).ok_or_else(|| PipelineError::Stage {
        stage: StageName::Denoise,
        message: "bilateral output buffer size mismatch".to_string(),
    })
}

/// Non-local means with square template/search windows of the given radii
fn non_local_means(img: &GrayImage, h: f32, template_radius: u32, search_radius: u32) -> GrayImage {
    let (width, height) = img.dimensions();
    let (w, ht) = (width as i64, height as i64);
    let t = template_radius as i64;
    let s = search_radius as i64;
    let patch_area = ((2 * t + 1) * (2 * t + 1)) as f32;
    let h2 = h * h;

    let at = |x: i64, y: i64| img.get_pixel(x.clamp(0, w - 1) as u32, y.clamp(0, ht - 1) as u32).0[0] as f32;

    GrayImage::from_fn(width, height, |x, y| {
        let (x, y) = (x as i64, y as i64);
        let mut weighted = 0f32;
        let mut weight_sum = 0f32;

        for qy in (y - s).max(0)..=(y + s).min(ht - 1) {
            for qx in (x - s).max(0)..=(x + s).min(w - 1) {
                let mut distance = 0f32;
                for oy in -t..=t {
                    for ox in -t..=t {
                        let d = at(x + ox, y + oy) - at(qx + ox, qy + oy);
                        distance += d * d;
                    }
                }
                let weight = (-(distance / patch_area) / h2).exp();
                weighted += weight * at(qx, qy);
                weight_sum += weight;
            }
        }

        image::Luma([(weighted / weight_sum).round().clamp(0.0, 255.0) as u8])
    })
}

use crate::error::{PipelineError, ValidationError};
use crate::raster::Image;
use crate::registry::{Params, Precondition, StageName};
use image::{GrayImage, Luma};

/// Contrast-limited adaptive histogram equalization
#[derive(Debug, Clone, PartialEq)]
pub struct Method {
    /// Histogram clip height, as a multiple of the uniform bin height
    pub clip_limit: f32,
    /// Tiles per side
    pub tile_grid_size: u32,
}

impl Method {
    pub fn from_params(method: &str, params: &Params) -> Result<Self, ValidationError> {
        match method {
            "clahe" => Ok(Self {
                clip_limit: params.float("clip_limit")? as f32,
                tile_grid_size: params.int("tile_grid_size")? as u32,
            }),
            other => Err(super::unknown_method(StageName::Clahe, other)),
        }
    }
}

/// Equalize local contrast tile by tile, blending neighbouring tile
/// mappings bilinearly so tile borders stay invisible.
pub fn apply(image: Image, method: &Method) -> Result<Image, PipelineError> {
    let gray = match image {
        Image::Gray(gray) => gray,
        Image::Color(_) => {
            return Err(PipelineError::Precondition {
                stage: StageName::Clahe,
                precondition: Precondition::SingleChannel.describe(),
            })
        }
    };
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return Ok(Image::Gray(gray));
    }

    // Right and bottom edges are mirrored out to a whole number of equal
    // tiles, so every tile is non-empty and has the same area.
    let tiles_x = method.tile_grid_size.clamp(1, width);
    let tiles_y = method.tile_grid_size.clamp(1, height);
    let tile_width = width.div_ceil(tiles_x);
    let tile_height = height.div_ceil(tiles_y);
    let sample = |x: u32, y: u32| gray.get_pixel(reflect(x, width), reflect(y, height)).0[0];

    let mut luts = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let mut histogram = [0u32; 256];
            for y in ty * tile_height..(ty + 1) * tile_height {
                for x in tx * tile_width..(tx + 1) * tile_width {
                    histogram[sample(x, y) as usize] += 1;
                }
            }
            luts.push(tile_lut(histogram, tile_width * tile_height, method.clip_limit));
        }
    }
    let lut_at = |tx: u32, ty: u32| &luts[(ty * tiles_x + tx) as usize];

    let output = GrayImage::from_fn(width, height, |x, y| {
        let (tx0, tx1, wx) = neighbours(x, tile_width, tiles_x);
        let (ty0, ty1, wy) = neighbours(y, tile_height, tiles_y);
        let value = gray.get_pixel(x, y).0[0] as usize;

        let top = lut_at(tx0, ty0)[value] as f32 * (1.0 - wx) + lut_at(tx1, ty0)[value] as f32 * wx;
        let bottom = lut_at(tx0, ty1)[value] as f32 * (1.0 - wx) + lut_at(tx1, ty1)[value] as f32 * wx;
        Luma([(top * (1.0 - wy) + bottom * wy).round().clamp(0.0, 255.0) as u8])
    });

    Ok(Image::Gray(output))
}

/// Mirror a coordinate past the far edge back inside `[0, len)`, without
/// repeating the edge pixel.
fn reflect(pos: u32, len: u32) -> u32 {
    if pos < len {
        pos
    } else {
        (2 * (len - 1)).saturating_sub(pos)
    }
}

/// Indices of the two tiles whose centres bracket `pos`, and the weight of
/// the second one.
fn neighbours(pos: u32, tile_size: u32, tiles: u32) -> (u32, u32, f32) {
    let f = (pos as f32 + 0.5) / tile_size as f32 - 0.5;
    if f <= 0.0 {
        return (0, 0, 0.0);
    }
    let lower = f.floor() as u32;
    if lower >= tiles - 1 {
        return (tiles - 1, tiles - 1, 0.0);
    }
    (lower, lower + 1, f - lower as f32)
}

/// Clipped-histogram equalization mapping for one tile of `area` pixels
fn tile_lut(mut histogram: [u32; 256], area: u32, clip_limit: f32) -> [u8; 256] {
    let area = area.max(1);
    let clip = ((clip_limit * area as f32 / 256.0).round() as u32).max(1);

    let mut excess = 0u32;
    for count in histogram.iter_mut() {
        if *count > clip {
            excess += *count - clip;
            *count = clip;
        }
    }

    // Redistribute clipped counts uniformly
    let increment = excess / 256;
    let mut remainder = excess % 256;
    for count in histogram.iter_mut() {
        *count += increment;
        if remainder > 0 {
            *count += 1;
            remainder -= 1;
        }
    }

    let mut lut = [0u8; 256];
    let mut cumulative = 0u32;
    for (value, out) in lut.iter_mut().enumerate() {
        cumulative += histogram[value];
        *out = (cumulative as f32 * 255.0 / area as f32).round().min(255.0) as u8;
    }
    lut
}

//! Owned 8-bit raster images with explicit channel depth.

use image::{DynamicImage, GrayImage, RgbImage};

/// A dense 8-bit raster, either single-channel or three-channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Image {
    Gray(GrayImage),
    Color(RgbImage),
}

impl Image {
    /// Convert a decoded image into a pipeline image.
    ///
    /// `Luma8` and `Rgb8` are taken as-is. Other layouts are converted to the
    /// closest 8-bit form (alpha dropped), except 16-bit/float data which is
    /// narrowed by the `image` crate's conversion rules.
    pub fn from_dynamic(image: DynamicImage) -> Self {
        match image {
            DynamicImage::ImageLuma8(gray) => Image::Gray(gray),
            DynamicImage::ImageRgb8(rgb) => Image::Color(rgb),
            DynamicImage::ImageLumaA8(_) | DynamicImage::ImageLuma16(_) | DynamicImage::ImageLumaA16(_) => {
                Image::Gray(image.to_luma8())
            }
            other => Image::Color(other.to_rgb8()),
        }
    }

    pub fn into_dynamic(self) -> DynamicImage {
        match self {
            Image::Gray(gray) => DynamicImage::ImageLuma8(gray),
            Image::Color(rgb) => DynamicImage::ImageRgb8(rgb),
        }
    }

    /// Number of channels: 1 for gray, 3 for color.
    pub fn channels(&self) -> u8 {
        match self {
            Image::Gray(_) => 1,
            Image::Color(_) => 3,
        }
    }

    pub fn width(&self) -> u32 {
        self.dimensions().0
    }

    pub fn height(&self) -> u32 {
        self.dimensions().1
    }

    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Image::Gray(gray) => gray.dimensions(),
            Image::Color(rgb) => rgb.dimensions(),
        }
    }

    /// Luma copy used by detectors (deskew); color is converted, gray cloned.
    pub fn to_luma(&self) -> GrayImage {
        match self {
            Image::Gray(gray) => gray.clone(),
            Image::Color(rgb) => image::imageops::grayscale(rgb),
        }
    }

    /// Raw interleaved sample buffer.
    pub fn as_raw(&self) -> &[u8] {
        match self {
            Image::Gray(gray) => gray.as_raw(),
            Image::Color(rgb) => rgb.as_raw(),
        }
    }
}

impl From<GrayImage> for Image {
    fn from(gray: GrayImage) -> Self {
        Image::Gray(gray)
    }
}

impl From<RgbImage> for Image {
    fn from(rgb: RgbImage) -> Self {
        Image::Color(rgb)
    }
}

/// Split an RGB image into three single-channel planes.
pub(crate) fn split_channels(rgb: &RgbImage) -> [GrayImage; 3] {
    let (width, height) = rgb.dimensions();
    [0usize, 1, 2].map(|c| GrayImage::from_fn(width, height, |x, y| image::Luma([rgb.get_pixel(x, y).0[c]])))
}

/// Inverse of [`split_channels`]. All planes must share dimensions.
pub(crate) fn merge_channels(planes: &[GrayImage; 3]) -> RgbImage {
    let (width, height) = planes[0].dimensions();
    RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([
            planes[0].get_pixel(x, y).0[0],
            planes[1].get_pixel(x, y).0[0],
            planes[2].get_pixel(x, y).0[0],
        ])
    })
}

use crate::error::{PipelineError, ValidationError};
use crate::raster::Image;
use crate::registry::{Params, StageName};
use image::{GrayImage, Luma, Rgb};
use imageproc::contours::{find_contours, BorderType};
use imageproc::contrast::otsu_level;
use imageproc::edges::canny;
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use imageproc::geometry::min_area_rect;
use imageproc::point::Point;

/// Corrections smaller than this are not worth the interpolation blur
const MIN_CORRECTION_DEGREES: f32 = 0.1;

/// Skew estimation methods. All angles are in degrees.
#[derive(Debug, Clone, PartialEq)]
pub enum Method {
    /// Angle maximizing row-wise foreground variance, coarse `step` then refined
    ProjectionProfile { max_angle: f32, step: f32 },
    /// Strongest straight edge line found by a Hough vote over edge pixels
    Hough { max_angle: f32 },
    /// Minimum-area rectangle around the foreground contours
    MinAreaRect { max_angle: f32 },
}

impl Method {
    pub fn from_params(method: &str, params: &Params) -> Result<Self, ValidationError> {
        let max_angle = params.float("max_angle")? as f32;
        match method {
            "projection_profile" => Ok(Self::ProjectionProfile {
                max_angle,
                step: params.float("step")? as f32,
            }),
            "hough" => Ok(Self::Hough { max_angle }),
            "min_area_rect" => Ok(Self::MinAreaRect { max_angle }),
            other => Err(super::unknown_method(StageName::Deskew, other)),
        }
    }

    fn max_angle(&self) -> f32 {
        match self {
            Self::ProjectionProfile { max_angle, .. } | Self::Hough { max_angle } | Self::MinAreaRect { max_angle } => {
                *max_angle
            }
        }
    }
}

/// Deskew image by detecting and correcting rotation.
/// Dimensions and channel depth are preserved; exposed corners are filled white.
pub fn apply(image: Image, method: &Method) -> Result<Image, PipelineError> {
    let angle = estimate_correction(&image.to_luma(), method);

    if angle.abs() < MIN_CORRECTION_DEGREES {
        return Ok(image);
    }

    tracing::debug!(correction_degrees = angle, ?method, "rotating to correct skew");

    let theta = angle.to_radians();
    Ok(match image {
        Image::Gray(gray) => Image::Gray(rotate_about_center(&gray, theta, Interpolation::Bilinear, Luma([255u8]))),
        Image::Color(rgb) => Image::Color(rotate_about_center(
            &rgb,
            theta,
            Interpolation::Bilinear,
            Rgb([255u8, 255, 255]),
        )),
    })
}

/// Rotation (degrees, image-clockwise positive) that levels the text,
/// clamped to `[-max_angle, max_angle]`.
///
/// Images without a usable foreground yield 0.
pub fn estimate_correction(gray: &GrayImage, method: &Method) -> f32 {
    let max_angle = method.max_angle();
    let Some(mask) = foreground_mask(gray) else {
        return 0.0;
    };

    let angle = match method {
        Method::ProjectionProfile { max_angle, step } => {
            let points = mask_points(&mask);
            let radius = max_radius(&points);
            let score = |angle: f32| {
                rotated_row_histogram(&points, angle, radius)
                    .iter()
                    .map(|&c| (c as f64) * (c as f64))
                    .sum::<f64>()
            };
            let coarse = best_angle(&candidate_angles(0.0, *max_angle, *step, *max_angle), &score);
            best_angle(&candidate_angles(coarse, *step, *step / 5.0, *max_angle), &score)
        }
        Method::Hough { max_angle } => {
            let edges = canny(gray, 50.0, 150.0);
            let points = mask_points(&edges);
            if points.is_empty() {
                return 0.0;
            }
            let radius = max_radius(&points);
            // Votes of the single strongest line at this angle
            let score = |angle: f32| {
                rotated_row_histogram(&points, angle, radius)
                    .into_iter()
                    .max()
                    .unwrap_or(0) as f64
            };
            let coarse = best_angle(&candidate_angles(0.0, *max_angle, 1.0, *max_angle), &score);
            best_angle(&candidate_angles(coarse, 1.0, 0.1, *max_angle), &score)
        }
        Method::MinAreaRect { .. } => min_area_rect_angle(&mask),
    };

    angle.clamp(-max_angle, max_angle)
}

/// Dark-text foreground (255) from an Otsu split; polarity is flipped when
/// "dark" covers most of the image. `None` for images without contrast.
fn foreground_mask(gray: &GrayImage) -> Option<GrayImage> {
    let total = gray.width() as usize * gray.height() as usize;
    if total == 0 {
        return None;
    }

    let level = otsu_level(gray);
    let dark = gray.pixels().filter(|p| p.0[0] <= level).count();
    if dark == 0 || dark == total {
        return None;
    }

    let text_is_dark = dark <= total / 2;
    let mut mask = GrayImage::new(gray.width(), gray.height());
    for (x, y, pixel) in gray.enumerate_pixels() {
        let is_dark = pixel.0[0] <= level;
        if is_dark == text_is_dark {
            mask.put_pixel(x, y, Luma([255]));
        }
    }
    Some(mask)
}

/// Non-zero pixels as coordinates relative to the image centre
fn mask_points(mask: &GrayImage) -> Vec<(f32, f32)> {
    let cx = mask.width() as f32 / 2.0;
    let cy = mask.height() as f32 / 2.0;
    mask.enumerate_pixels()
        .filter(|(_, _, p)| p.0[0] > 0)
        .map(|(x, y, _)| (x as f32 - cx, y as f32 - cy))
        .collect()
}

fn max_radius(points: &[(f32, f32)]) -> f32 {
    points
        .iter()
        .map(|(x, y)| (x * x + y * y).sqrt())
        .fold(0.0, f32::max)
}

/// Row counts of the points after rotating them by `angle` degrees about the
/// centre. This is the same forward mapping `rotate_about_center` applies, so
/// the best-scoring angle is directly the correction to apply.
fn rotated_row_histogram(points: &[(f32, f32)], angle: f32, radius: f32) -> Vec<u32> {
    let (sin_a, cos_a) = angle.to_radians().sin_cos();
    let offset = radius.ceil() + 1.0;
    let mut rows = vec![0u32; (2.0 * offset) as usize + 1];
    for &(dx, dy) in points {
        let row = (dx * sin_a + dy * cos_a + offset).floor();
        if row >= 0.0 && (row as usize) < rows.len() {
            rows[row as usize] += 1;
        }
    }
    rows
}

/// Angles `center + i * step` within `half_range` of `center` and inside
/// `[-max_angle, max_angle]`, ordered by increasing magnitude, positive first.
fn candidate_angles(center: f32, half_range: f32, step: f32, max_angle: f32) -> Vec<f32> {
    let n = (half_range / step + 1e-4).floor() as i32;
    let mut angles: Vec<f32> = (-n..=n)
        .map(|i| center + i as f32 * step)
        .filter(|a| a.abs() <= max_angle + 1e-4)
        .collect();
    angles.sort_by(|a, b| a.abs().total_cmp(&b.abs()).then(b.total_cmp(a)));
    angles
}

/// Highest-scoring candidate. Only a strictly higher score replaces the
/// incumbent, so with magnitude-ordered candidates ties go to the smallest
/// absolute angle.
fn best_angle(candidates: &[f32], score: impl Fn(f32) -> f64) -> f32 {
    let mut best = (0.0f32, f64::NEG_INFINITY);
    for &angle in candidates {
        let s = score(angle);
        if s > best.1 {
            best = (angle, s);
        }
    }
    best.0
}

fn min_area_rect_angle(mask: &GrayImage) -> f32 {
    let points: Vec<Point<i32>> = find_contours::<i32>(mask)
        .into_iter()
        .filter(|contour| contour.border_type == BorderType::Outer)
        .flat_map(|contour| contour.points)
        .collect();
    if points.len() < 3 {
        return 0.0;
    }

    let rect = min_area_rect(&points);
    let edge = |a: Point<i32>, b: Point<i32>| ((b.x - a.x) as f32, (b.y - a.y) as f32);
    let (e1, e2) = (edge(rect[0], rect[1]), edge(rect[1], rect[2]));
    let len = |(x, y): (f32, f32)| x * x + y * y;
    let (dx, dy) = if len(e1) >= len(e2) { e1 } else { e2 };
    if dx == 0.0 && dy == 0.0 {
        return 0.0;
    }

    // Direction of the long side folded into (-45, 45]
    let mut skew = dy.atan2(dx).to_degrees();
    while skew > 45.0 {
        skew -= 90.0;
    }
    while skew <= -45.0 {
        skew += 90.0;
    }
    -skew
}

#[cfg(test)]
mod tests {
    use super::*;

    /// White page with dark horizontal text-like bars, rotated by `angle` degrees
    fn skewed_page(angle: f32) -> GrayImage {
        let mut img = GrayImage::from_pixel(200, 120, Luma([255]));
        for line in 0..4 {
            let y0 = 25 + line * 20;
            for y in y0..y0 + 6 {
                for x in 30..170 {
                    img.put_pixel(x, y, Luma([0]));
                }
            }
        }
        if angle == 0.0 {
            return img;
        }
        rotate_about_center(&img, angle.to_radians(), Interpolation::Bilinear, Luma([255]))
    }

    fn all_methods(max_angle: f32) -> [Method; 3] {
        [
            Method::ProjectionProfile { max_angle, step: 0.5 },
            Method::Hough { max_angle },
            Method::MinAreaRect { max_angle },
        ]
    }

    #[test]
    fn test_deskew_detects_zero_angle_for_straight_image() {
        let img = skewed_page(0.0);
        for method in all_methods(10.0) {
            let angle = estimate_correction(&img, &method);
            assert!(angle.abs() < 0.5, "{:?}: expected near-zero angle, got {}", method, angle);
        }
    }

    #[test]
    fn test_deskew_recovers_known_rotation() {
        let img = skewed_page(5.0);
        for method in all_methods(10.0) {
            let angle = estimate_correction(&img, &method);
            assert!((angle + 5.0).abs() < 1.0, "{:?}: expected about -5, got {}", method, angle);
        }
    }

    #[test]
    fn test_hough_resolves_fractional_degrees() {
        let img = skewed_page(2.5);
        let angle = estimate_correction(&img, &Method::Hough { max_angle: 10.0 });
        assert!((angle + 2.5).abs() < 0.4, "expected about -2.5, got {}", angle);
    }

    #[test]
    fn test_deskew_clamps_to_max_angle() {
        let img = skewed_page(8.0);
        for method in all_methods(3.0) {
            let angle = estimate_correction(&img, &method);
            assert!(angle.abs() <= 3.0 + 1e-4, "{:?}: {} exceeds bound", method, angle);
        }
    }

    #[test]
    fn test_deskew_preserves_dimensions_and_depth() {
        let img = skewed_page(4.0);
        let method = Method::ProjectionProfile { max_angle: 10.0, step: 0.5 };
        let result = apply(Image::Gray(img), &method).unwrap();
        assert_eq!(result.dimensions(), (200, 120));
        assert_eq!(result.channels(), 1);
    }

    #[test]
    fn test_deskew_leaves_blank_image_untouched() {
        let img = GrayImage::new(100, 50);
        let method = Method::Hough { max_angle: 10.0 };
        let result = apply(Image::Gray(img.clone()), &method).unwrap();
        assert_eq!(result, Image::Gray(img));
    }

    #[test]
    fn test_candidate_order_prefers_small_positive_angles() {
        let angles = candidate_angles(0.0, 1.0, 0.5, 1.0);
        assert_eq!(angles, vec![0.0, 0.5, -0.5, 1.0, -1.0]);
    }

    #[test]
    fn test_best_angle_tie_breaks_to_smallest_magnitude() {
        // Symmetric score: +1 and -1 tie, as do +2/-2
        let candidates = candidate_angles(0.0, 2.0, 1.0, 2.0);
        let angle = best_angle(&candidates, |a| if a == 0.0 { 0.0 } else { 1.0 });
        assert_eq!(angle, 1.0);
    }
}

//! Colour-range feature detection on captured frames.
//!
//! This module provides:
//! - HSV conversion, once-per-frame HSV buffers and inclusive colour ranges
//!   (`rgb_to_hsv`, `HsvImage`, `ColorRange`)
//! - The fixed per-feature colour table (`Feature`)
//! - Binary masks with morphology and pixel statistics (`ColorMask`)
//! - Blob extraction with shape filters (`find_blobs`)
//! - Frame reduction before classification (`downscale`)

pub mod blobs;
pub mod hsv;
pub mod mask;
pub mod palette;

pub use blobs::{extract_blobs, find_blobs, BlobCandidate, BlobFilter};
pub use hsv::{rgb_to_hsv, ColorRange, HsvImage};
pub use mask::{median, percentile, ColorMask};
pub use palette::Feature;

use image::imageops::{self, FilterType};
use image::RgbImage;

/// Resamples a frame by `scale` (0.5 halves each side) before classification.
///
/// Integer reductions (1/2, 1/3, ...) average each k×k block; other scales
/// pick the nearest pixel. Dimensions never drop below 1 pixel. A scale of
/// 1.0 returns a copy.
pub fn downscale(img: &RgbImage, scale: f32) -> RgbImage {
    if (scale - 1.0).abs() < f32::EPSILON {
        return img.clone();
    }
    let w = ((img.width() as f32 * scale) as u32).max(1);
    let h = ((img.height() as f32 * scale) as u32).max(1);

    let inverse = 1.0 / scale;
    let factor = inverse.round();
    if factor >= 2.0 && (inverse - factor).abs() < 1e-3 {
        box_reduce(img, factor as u32, w, h)
    } else {
        imageops::resize(img, w, h, FilterType::Nearest)
    }
}

/// Averages `k`×`k` blocks into a `w`×`h` frame; edge blocks are clipped.
fn box_reduce(img: &RgbImage, k: u32, w: u32, h: u32) -> RgbImage {
    let (src_w, src_h) = (img.width() as usize, img.height() as usize);
    let src = img.as_raw();
    let (w, h, k) = (w as usize, h as usize, k as usize);
    let mut out = vec![0u8; w * h * 3];
    let mut sums = vec![0u32; w * 3];

    for (oy, dst_row) in out.chunks_exact_mut(w * 3).enumerate() {
        sums.fill(0);
        let y0 = oy * k;
        let y1 = (y0 + k).min(src_h);
        for y in y0..y1 {
            let row = &src[y * src_w * 3..(y + 1) * src_w * 3];
            for (x, px) in row.chunks_exact(3).enumerate() {
                let ox = x / k;
                if ox >= w {
                    break;
                }
                sums[ox * 3] += px[0] as u32;
                sums[ox * 3 + 1] += px[1] as u32;
                sums[ox * 3 + 2] += px[2] as u32;
            }
        }
        for ox in 0..w {
            let x0 = ox * k;
            let cols = ((x0 + k).min(src_w) - x0) as u32;
            let n = cols * (y1 - y0) as u32;
            for c in 0..3 {
                dst_row[ox * 3 + c] = ((sums[ox * 3 + c] + n / 2) / n) as u8;
            }
        }
    }

    RgbImage::from_raw(w as u32, h as u32, out)
        .unwrap_or_else(|| RgbImage::new(w as u32, h as u32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_downscale_halves_dimensions() {
        let img = RgbImage::from_pixel(401, 300, Rgb([10, 20, 30]));
        let small = downscale(&img, 0.5);
        assert_eq!(small.dimensions(), (200, 150));
        assert_eq!(small.get_pixel(100, 75), &Rgb([10, 20, 30]));
    }

    #[test]
    fn test_half_scale_averages_blocks() {
        let img = RgbImage::from_fn(4, 2, |x, _| match x {
            0 | 1 => Rgb([255, 255, 255]),
            2 => Rgb([100, 0, 0]),
            _ => Rgb([0, 0, 0]),
        });
        let small = downscale(&img, 0.5);
        assert_eq!(small.dimensions(), (2, 1));
        assert_eq!(small.get_pixel(0, 0), &Rgb([255, 255, 255]));
        assert_eq!(small.get_pixel(1, 0), &Rgb([50, 0, 0]));
    }

    #[test]
    fn test_non_integer_scale_keeps_source_colours() {
        let img = RgbImage::from_fn(10, 10, |x, _| {
            if x < 5 { Rgb([0, 255, 0]) } else { Rgb([255, 255, 255]) }
        });
        let small = downscale(&img, 0.7);
        assert_eq!(small.dimensions(), (7, 7));
        assert!(small
            .pixels()
            .all(|p| *p == Rgb([0, 255, 0]) || *p == Rgb([255, 255, 255])));
    }

    /// Per-tick ring pipeline on a full HD frame; only meaningful in release.
    #[test]
    #[ignore = "timing; run with --release -- --ignored"]
    fn test_ring_tick_detection_fits_budget() {
        use std::time::{Duration, Instant};

        let mut frame = RgbImage::new(1920, 1080);
        for y in 500..580u32 {
            for x in 900..980u32 {
                let (dx, dy) = (x as i32 - 940, y as i32 - 540);
                if dx * dx + dy * dy <= 1600 {
                    frame.put_pixel(x, y, Rgb([255, 255, 255]));
                }
            }
        }
        let filter = BlobFilter::new(40.0, 2.0, 0.2, 0.0)
            .with_edge_margins(0.2, 0.1)
            .with_min_radius(5.0)
            .with_close_iterations(2);

        let runs = 20;
        let start = Instant::now();
        for _ in 0..runs {
            let hsv = HsvImage::from_rgb(&downscale(&frame, 0.5));
            let greens = find_blobs(&hsv, Feature::RingGreen.range(), &filter);
            let whites = find_blobs(&hsv, Feature::RingWhite.range(), &filter);
            assert!(greens.is_empty());
            assert_eq!(whites.len(), 1);
        }
        let per_tick = start.elapsed() / runs;
        if !cfg!(debug_assertions) {
            assert!(per_tick < Duration::from_millis(5), "per tick {:?}", per_tick);
        }
    }

    #[test]
    fn test_downscale_never_empty() {
        let img = RgbImage::new(1, 1);
        assert_eq!(downscale(&img, 0.25).dimensions(), (1, 1));
    }
}

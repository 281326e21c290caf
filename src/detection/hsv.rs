//! RGB → HSV conversion on the 8-bit scale used by the colour tables.
//!
//! Hue is stored as degrees / 2 (0..180) so it fits a byte; saturation and
//! value span 0..=255.

use image::RgbImage;

/// An inclusive lower/upper bound pair in 8-bit HSV space.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColorRange {
    pub lo: [u8; 3],
    pub hi: [u8; 3],
}

impl ColorRange {
    pub const fn new(lo: [u8; 3], hi: [u8; 3]) -> Self {
        Self { lo, hi }
    }

    /// Returns true if every channel of `hsv` lies within the bounds.
    #[inline]
    pub fn contains(&self, hsv: [u8; 3]) -> bool {
        (0..3).all(|i| hsv[i] >= self.lo[i] && hsv[i] <= self.hi[i])
    }

    /// Classifies an RGB pixel directly.
    #[inline]
    pub fn matches_rgb(&self, r: u8, g: u8, b: u8) -> bool {
        self.contains(rgb_to_hsv(r, g, b))
    }
}

/// Converts one RGB pixel to `[h, s, v]`.
///
/// Integer-only; hue rounds half up.
#[inline]
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> [u8; 3] {
    let (r, g, b) = (r as i32, g as i32, b as i32);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let v = max;
    let s = if max == 0 {
        0
    } else {
        (delta * 255 + max / 2) / max
    };

    if delta == 0 {
        return [0, s as u8, v as u8];
    }

    // Hue in half-degrees, scaled by `delta`
    let mut h = if max == r {
        30 * (g - b)
    } else if max == g {
        60 * delta + 30 * (b - r)
    } else {
        120 * delta + 30 * (r - g)
    };
    if h < 0 {
        h += 180 * delta;
    }

    let h = ((2 * h + delta) / (2 * delta)) % 180;
    [h as u8, s as u8, v as u8]
}

/// A frame converted to HSV once, for classifying against several ranges.
#[derive(Clone, Debug)]
pub struct HsvImage {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl HsvImage {
    pub fn from_rgb(img: &RgbImage) -> Self {
        let mut data = Vec::with_capacity(img.as_raw().len());
        for px in img.as_raw().chunks_exact(3) {
            data.extend_from_slice(&rgb_to_hsv(px[0], px[1], px[2]));
        }
        Self {
            width: img.width(),
            height: img.height(),
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Packed `[h, s, v]` triples in row-major order.
    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_colors() {
        assert_eq!(rgb_to_hsv(255, 0, 0), [0, 255, 255]);
        assert_eq!(rgb_to_hsv(0, 255, 0), [60, 255, 255]);
        assert_eq!(rgb_to_hsv(0, 0, 255), [120, 255, 255]);
    }

    #[test]
    fn test_grays_have_no_hue_or_saturation() {
        assert_eq!(rgb_to_hsv(0, 0, 0), [0, 0, 0]);
        assert_eq!(rgb_to_hsv(255, 255, 255), [0, 0, 255]);
        assert_eq!(rgb_to_hsv(128, 128, 128), [0, 0, 128]);
    }

    #[test]
    fn test_dim_yellow() {
        // Bar-zone fixture colour used elsewhere in the tests
        assert_eq!(rgb_to_hsv(200, 180, 40), [26, 204, 200]);
    }

    #[test]
    fn test_hue_wraps_below_zero() {
        // Magenta-ish red: max is red and g < b gives a negative raw hue
        let [h, _, _] = rgb_to_hsv(255, 0, 30);
        assert!(h > 170, "hue was {}", h);
    }

    #[test]
    fn test_hue_matches_rounded_float_formula() {
        for &(r, g, b) in &[(200u8, 180u8, 40u8), (10, 200, 90), (30, 60, 250), (250, 20, 140), (90, 91, 92)] {
            let (rf, gf, bf) = (r as f32, g as f32, b as f32);
            let max = rf.max(gf).max(bf);
            let delta = max - rf.min(gf).min(bf);
            let mut h = if max == rf {
                60.0 * (gf - bf) / delta
            } else if max == gf {
                120.0 + 60.0 * (bf - rf) / delta
            } else {
                240.0 + 60.0 * (rf - gf) / delta
            };
            if h < 0.0 {
                h += 360.0;
            }
            let expected = ((h / 2.0).round() as i32 % 180) as u8;
            assert_eq!(rgb_to_hsv(r, g, b)[0], expected, "rgb {:?}", (r, g, b));
        }
    }

    #[test]
    fn test_hsv_image_converts_every_pixel() {
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(1, 0, image::Rgb([0, 255, 0]));
        let hsv = HsvImage::from_rgb(&img);
        assert_eq!((hsv.width(), hsv.height()), (2, 1));
        assert_eq!(hsv.as_raw(), &[0, 0, 0, 60, 255, 255]);
    }

    #[test]
    fn test_range_contains_is_inclusive() {
        let range = ColorRange::new([10, 20, 30], [20, 40, 60]);
        assert!(range.contains([10, 20, 30]));
        assert!(range.contains([20, 40, 60]));
        assert!(!range.contains([21, 40, 60]));
        assert!(!range.contains([15, 19, 45]));
    }
}

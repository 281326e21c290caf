//! Binary colour masks and the morphology applied to them.

use image::{GrayImage, RgbImage};

use super::hsv::{ColorRange, HsvImage};

/// The 5×5 elliptical structuring element is the union of a 5-wide, 3-tall
/// rectangle and a 5-tall centre column; both halves are separable.
const ELLIPSE_HALF_WIDTH: usize = 2;
const ELLIPSE_HALF_HEIGHT: usize = 1;
const ELLIPSE_COLUMN_HALF: usize = 2;

const ON: u8 = 255;

/// A binary mask: 255 where a pixel matched, 0 elsewhere.
#[derive(Clone, Debug)]
pub struct ColorMask {
    img: GrayImage,
}

impl ColorMask {
    /// Thresholds every pixel of `img` against `range`.
    pub fn from_image(img: &RgbImage, range: &ColorRange) -> Self {
        let mut out = GrayImage::new(img.width(), img.height());
        for (dst, px) in out.iter_mut().zip(img.as_raw().chunks_exact(3)) {
            if range.matches_rgb(px[0], px[1], px[2]) {
                *dst = ON;
            }
        }
        Self { img: out }
    }

    /// Thresholds an already-converted frame against `range`.
    pub fn from_hsv(img: &HsvImage, range: &ColorRange) -> Self {
        let mut out = GrayImage::new(img.width(), img.height());
        for (dst, px) in out.iter_mut().zip(img.as_raw().chunks_exact(3)) {
            if range.contains([px[0], px[1], px[2]]) {
                *dst = ON;
            }
        }
        Self { img: out }
    }

    /// Wraps an existing grayscale image; any non-zero pixel counts as set.
    pub fn from_gray(img: GrayImage) -> Self {
        Self { img }
    }

    pub fn width(&self) -> u32 {
        self.img.width()
    }

    pub fn height(&self) -> u32 {
        self.img.height()
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> bool {
        self.img.get_pixel(x, y)[0] != 0
    }

    /// Row-major mask bytes; non-zero means set.
    pub fn as_raw(&self) -> &[u8] {
        self.img.as_raw()
    }

    /// Number of set pixels.
    pub fn count(&self) -> usize {
        self.img.as_raw().iter().filter(|&&v| v != 0).count()
    }

    /// Clears the first `rows` rows.
    pub fn clear_top_rows(&mut self, rows: u32) {
        let rows = rows.min(self.height());
        let end = (rows * self.width()) as usize;
        let raw: &mut [u8] = &mut self.img;
        raw[..end].fill(0);
    }

    /// Coordinates of every set pixel as separate row and column lists,
    /// in row-major scan order (so `ys` is already sorted).
    pub fn coordinates(&self) -> (Vec<u32>, Vec<u32>) {
        let w = self.width() as usize;
        let mut xs = Vec::new();
        let mut ys = Vec::new();
        for (i, _) in self.img.as_raw().iter().enumerate().filter(|(_, v)| **v != 0) {
            xs.push((i % w) as u32);
            ys.push((i / w) as u32);
        }
        (xs, ys)
    }

    /// Morphological closing: `iterations` dilations followed by as many erosions.
    pub fn close(&mut self, iterations: usize) {
        for _ in 0..iterations {
            self.dilate();
        }
        for _ in 0..iterations {
            self.erode();
        }
    }

    /// Morphological opening: one erosion followed by one dilation.
    pub fn open(&mut self) {
        self.erode();
        self.dilate();
    }

    /// Sets every pixel whose elliptical neighbourhood touches a set pixel.
    pub fn dilate(&mut self) {
        self.morph(Window::Any);
    }

    /// Keeps only pixels whose whole in-frame elliptical neighbourhood is set.
    pub fn erode(&mut self) {
        self.morph(Window::All);
    }

    fn morph(&mut self, window: Window) {
        let (w, h) = (self.width() as usize, self.height() as usize);
        if w == 0 || h == 0 {
            return;
        }
        let src = self.img.as_raw();

        let rows = slide_rows(src, w, h, ELLIPSE_HALF_WIDTH, window);
        let rect = slide_columns(&rows, w, h, ELLIPSE_HALF_HEIGHT, window);
        let column = slide_columns(src, w, h, ELLIPSE_COLUMN_HALF, window);

        let raw: &mut [u8] = &mut self.img;
        for ((dst, &a), &b) in raw.iter_mut().zip(&rect).zip(&column) {
            let set = match window {
                Window::Any => a != 0 || b != 0,
                Window::All => a != 0 && b != 0,
            };
            *dst = if set { ON } else { 0 };
        }
    }
}

/// Reduction applied over a sliding window. Out-of-frame samples are ignored.
#[derive(Clone, Copy)]
enum Window {
    Any,
    All,
}

impl Window {
    #[inline]
    fn keep(self, set: usize, in_frame: usize) -> u8 {
        let keep = match self {
            Window::Any => set > 0,
            Window::All => set == in_frame,
        };
        if keep { ON } else { 0 }
    }
}

/// Horizontal running-count pass with a window of `2 * half + 1`.
fn slide_rows(src: &[u8], w: usize, h: usize, half: usize, window: Window) -> Vec<u8> {
    let mut out = vec![0u8; w * h];
    for (row, dst) in src.chunks_exact(w).zip(out.chunks_exact_mut(w)).take(h) {
        let mut set = row[..(half + 1).min(w)].iter().filter(|&&v| v != 0).count();
        for x in 0..w {
            let lo = x.saturating_sub(half);
            let hi = (x + half).min(w - 1);
            dst[x] = window.keep(set, hi - lo + 1);
            if x + half + 1 < w && row[x + half + 1] != 0 {
                set += 1;
            }
            if x >= half && row[x - half] != 0 {
                set -= 1;
            }
        }
    }
    out
}

/// Vertical running-count pass with a window of `2 * half + 1`.
fn slide_columns(src: &[u8], w: usize, h: usize, half: usize, window: Window) -> Vec<u8> {
    let mut out = vec![0u8; w * h];
    let mut set = vec![0usize; w];
    for y in 0..(half + 1).min(h) {
        for (count, &v) in set.iter_mut().zip(&src[y * w..(y + 1) * w]) {
            *count += (v != 0) as usize;
        }
    }
    for y in 0..h {
        let lo = y.saturating_sub(half);
        let hi = (y + half).min(h - 1);
        let in_frame = hi - lo + 1;
        for (dst, &count) in out[y * w..(y + 1) * w].iter_mut().zip(&set) {
            *dst = window.keep(count, in_frame);
        }
        if y + half + 1 < h {
            let row = &src[(y + half + 1) * w..(y + half + 2) * w];
            for (count, &v) in set.iter_mut().zip(row) {
                *count += (v != 0) as usize;
            }
        }
        if y >= half {
            let row = &src[(y - half) * w..(y - half + 1) * w];
            for (count, &v) in set.iter_mut().zip(row) {
                *count -= (v != 0) as usize;
            }
        }
    }
    out
}

/// Linear-interpolated percentile of an ascending slice, truncated to an integer.
pub fn percentile(sorted: &[u32], pct: f64) -> Option<u32> {
    if sorted.is_empty() {
        return None;
    }
    let rank = (pct / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    let value = sorted[lo] as f64 + (sorted[hi] as f64 - sorted[lo] as f64) * frac;
    Some(value as u32)
}

/// Median of an ascending slice, truncated to an integer.
pub fn median(sorted: &[u32]) -> Option<u32> {
    percentile(sorted, 50.0)
}

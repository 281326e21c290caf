//! Blob extraction: connected regions of a colour mask that pass shape filters.
//!
//! The pipeline is threshold → close → open → 8-connected components →
//! per-component filters (area, aspect, fill against the minimal enclosing
//! circle, distance from the frame edge). It holds no state between calls.

use std::collections::VecDeque;
use std::f32::consts::PI;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::hsv::{ColorRange, HsvImage};
use super::mask::ColorMask;

/// Fixed seed for the enclosing-circle point shuffle; keeps results repeatable.
const SHUFFLE_SEED: u64 = 0x5eed_b10b;

/// Shape and position filters applied to each connected region.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlobFilter {
    /// Minimum filled area in pixels
    pub min_area: f32,
    /// Maximum bounding-box aspect ratio (long side / short side)
    pub max_aspect_ratio: f32,
    /// Minimum area / enclosing-circle area
    pub min_fill_ratio: f32,
    /// Minimum enclosing-circle radius in pixels
    pub min_radius: f32,
    /// Fraction of the frame width treated as a dead border on each side
    pub edge_margin_x: f32,
    /// Fraction of the frame height treated as a dead border on each side
    pub edge_margin_y: f32,
    /// Number of dilate/erode passes in the closing step
    pub close_iterations: usize,
}

impl BlobFilter {
    pub fn new(
        min_area: f32,
        max_aspect_ratio: f32,
        min_fill_ratio: f32,
        edge_margin_fraction: f32,
    ) -> Self {
        Self {
            min_area,
            max_aspect_ratio,
            min_fill_ratio,
            min_radius: 0.0,
            edge_margin_x: edge_margin_fraction,
            edge_margin_y: edge_margin_fraction,
            close_iterations: 1,
        }
    }

    pub fn with_edge_margins(mut self, x_fraction: f32, y_fraction: f32) -> Self {
        self.edge_margin_x = x_fraction;
        self.edge_margin_y = y_fraction;
        self
    }

    pub fn with_min_radius(mut self, radius: f32) -> Self {
        self.min_radius = radius;
        self
    }

    pub fn with_close_iterations(mut self, iterations: usize) -> Self {
        self.close_iterations = iterations;
        self
    }
}

/// A region that passed every filter, in the coordinates of the sampled buffer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlobCandidate {
    /// Centre of the minimal enclosing circle
    pub centroid_x: f32,
    pub centroid_y: f32,
    /// Filled area (enclosed holes included)
    pub area: f32,
    /// Radius of the minimal enclosing circle
    pub radius: f32,
    /// Bounding box as (min_x, min_y, max_x, max_y), inclusive
    pub bounds: (u32, u32, u32, u32),
}

/// Finds blobs of `range` colour in a frame already converted to HSV, so one
/// conversion serves every feature checked on that frame.
pub fn find_blobs(img: &HsvImage, range: &ColorRange, filter: &BlobFilter) -> Vec<BlobCandidate> {
    let mut mask = ColorMask::from_hsv(img, range);
    mask.close(filter.close_iterations);
    mask.open();
    extract_blobs(&mask, filter)
}

/// Runs component extraction and filtering on an already-cleaned mask.
pub fn extract_blobs(mask: &ColorMask, filter: &BlobFilter) -> Vec<BlobCandidate> {
    let (w, h) = (mask.width() as f32, mask.height() as f32);
    let margin_x = (w * filter.edge_margin_x).floor();
    let margin_y = (h * filter.edge_margin_y).floor();

    connected_components(mask)
        .into_iter()
        .filter_map(|component| {
            let area = component.filled_area() as f32;
            if area < filter.min_area {
                return None;
            }

            let (bw, bh) = component.size();
            let aspect = bw.max(bh) as f32 / bw.min(bh) as f32;
            if aspect > filter.max_aspect_ratio {
                return None;
            }

            let (cx, cy, radius) = min_enclosing_circle(&component.boundary());
            if radius < filter.min_radius {
                return None;
            }
            if radius > 0.0 && area / (PI * radius * radius) < filter.min_fill_ratio {
                return None;
            }

            if cx < margin_x || cx > w - margin_x || cy < margin_y || cy > h - margin_y {
                return None;
            }

            Some(BlobCandidate {
                centroid_x: cx,
                centroid_y: cy,
                area,
                radius,
                bounds: component.bounds,
            })
        })
        .collect()
}

/// One 8-connected region of set pixels.
struct Component {
    pixels: Vec<(u32, u32)>,
    bounds: (u32, u32, u32, u32),
}

impl Component {
    fn size(&self) -> (u32, u32) {
        let (x0, y0, x1, y1) = self.bounds;
        (x1 - x0 + 1, y1 - y0 + 1)
    }

    /// Local membership grid over the bounding box.
    fn grid(&self) -> (Vec<bool>, usize, usize) {
        let (bw, bh) = self.size();
        let (bw, bh) = (bw as usize, bh as usize);
        let mut grid = vec![false; bw * bh];
        for &(x, y) in &self.pixels {
            let lx = (x - self.bounds.0) as usize;
            let ly = (y - self.bounds.1) as usize;
            grid[ly * bw + lx] = true;
        }
        (grid, bw, bh)
    }

    /// Pixel count plus any holes fully enclosed by the region.
    fn filled_area(&self) -> usize {
        let (grid, bw, bh) = self.grid();
        let mut outside = vec![false; bw * bh];
        let mut queue = VecDeque::new();

        for x in 0..bw {
            for y in [0, bh - 1] {
                let i = y * bw + x;
                if !grid[i] && !outside[i] {
                    outside[i] = true;
                    queue.push_back((x, y));
                }
            }
        }
        for y in 0..bh {
            for x in [0, bw - 1] {
                let i = y * bw + x;
                if !grid[i] && !outside[i] {
                    outside[i] = true;
                    queue.push_back((x, y));
                }
            }
        }

        while let Some((x, y)) = queue.pop_front() {
            let neighbours = [
                (x.wrapping_sub(1), y),
                (x + 1, y),
                (x, y.wrapping_sub(1)),
                (x, y + 1),
            ];
            for (nx, ny) in neighbours {
                if nx >= bw || ny >= bh {
                    continue;
                }
                let i = ny * bw + nx;
                if !grid[i] && !outside[i] {
                    outside[i] = true;
                    queue.push_back((nx, ny));
                }
            }
        }

        bw * bh - outside.iter().filter(|&&o| o).count()
    }

    /// Centres of pixels on the region's edge.
    fn boundary(&self) -> Vec<(f32, f32)> {
        let (grid, bw, bh) = self.grid();
        let member = |x: isize, y: isize| {
            x >= 0 && y >= 0 && (x as usize) < bw && (y as usize) < bh && grid[y as usize * bw + x as usize]
        };
        self.pixels
            .iter()
            .filter(|&&(x, y)| {
                let lx = (x - self.bounds.0) as isize;
                let ly = (y - self.bounds.1) as isize;
                !(member(lx - 1, ly) && member(lx + 1, ly) && member(lx, ly - 1) && member(lx, ly + 1))
            })
            .map(|&(x, y)| (x as f32, y as f32))
            .collect()
    }
}

fn connected_components(mask: &ColorMask) -> Vec<Component> {
    let (w, h) = (mask.width() as usize, mask.height() as usize);
    let raw = mask.as_raw();
    let mut seen = vec![false; w * h];
    let mut components = Vec::new();
    let mut stack = Vec::new();

    for start_y in 0..h {
        for start_x in 0..w {
            let start = start_y * w + start_x;
            if seen[start] || raw[start] == 0 {
                continue;
            }

            seen[start] = true;
            stack.push((start_x, start_y));
            let mut pixels = Vec::new();
            let mut bounds = (start_x as u32, start_y as u32, start_x as u32, start_y as u32);

            while let Some((x, y)) = stack.pop() {
                pixels.push((x as u32, y as u32));
                bounds.0 = bounds.0.min(x as u32);
                bounds.1 = bounds.1.min(y as u32);
                bounds.2 = bounds.2.max(x as u32);
                bounds.3 = bounds.3.max(y as u32);

                for dy in -1isize..=1 {
                    for dx in -1isize..=1 {
                        if dx == 0 && dy == 0 {
                            continue;
                        }
                        let nx = x as isize + dx;
                        let ny = y as isize + dy;
                        if nx < 0 || ny < 0 || nx as usize >= w || ny as usize >= h {
                            continue;
                        }
                        let (nx, ny) = (nx as usize, ny as usize);
                        let i = ny * w + nx;
                        if !seen[i] && raw[i] != 0 {
                            seen[i] = true;
                            stack.push((nx, ny));
                        }
                    }
                }
            }

            components.push(Component { pixels, bounds });
        }
    }

    components
}

/// Smallest circle containing every point, as (cx, cy, radius).
///
/// Incremental Welzl construction over a seeded shuffle of the points.
pub fn min_enclosing_circle(points: &[(f32, f32)]) -> (f32, f32, f32) {
    if points.is_empty() {
        return (0.0, 0.0, 0.0);
    }

    let mut pts = points.to_vec();
    let mut rng = StdRng::seed_from_u64(SHUFFLE_SEED);
    pts.shuffle(&mut rng);

    let mut circle = (pts[0].0, pts[0].1, 0.0);
    for i in 1..pts.len() {
        if contains(circle, pts[i]) {
            continue;
        }
        circle = (pts[i].0, pts[i].1, 0.0);
        for j in 0..i {
            if contains(circle, pts[j]) {
                continue;
            }
            circle = diameter_circle(pts[i], pts[j]);
            for k in 0..j {
                if !contains(circle, pts[k]) {
                    circle = circumcircle(pts[i], pts[j], pts[k]);
                }
            }
        }
    }
    circle
}

#[inline]
fn contains((cx, cy, r): (f32, f32, f32), (x, y): (f32, f32)) -> bool {
    let dx = x - cx;
    let dy = y - cy;
    (dx * dx + dy * dy).sqrt() <= r + 1e-3
}

fn diameter_circle(a: (f32, f32), b: (f32, f32)) -> (f32, f32, f32) {
    let cx = (a.0 + b.0) / 2.0;
    let cy = (a.1 + b.1) / 2.0;
    let r = ((a.0 - cx).powi(2) + (a.1 - cy).powi(2)).sqrt();
    (cx, cy, r)
}

fn circumcircle(a: (f32, f32), b: (f32, f32), c: (f32, f32)) -> (f32, f32, f32) {
    let (ax, ay) = (a.0 as f64, a.1 as f64);
    let (bx, by) = (b.0 as f64, b.1 as f64);
    let (cx, cy) = (c.0 as f64, c.1 as f64);
    let d = 2.0 * (ax * (by - cy) + bx * (cy - ay) + cx * (ay - by));

    if d.abs() < 1e-9 {
        // Collinear: the widest pair spans the circle
        return [diameter_circle(a, b), diameter_circle(a, c), diameter_circle(b, c)]
            .into_iter()
            .fold((0.0, 0.0, -1.0), |best, c| if c.2 > best.2 { c } else { best });
    }

    let a2 = ax * ax + ay * ay;
    let b2 = bx * bx + by * by;
    let c2 = cx * cx + cy * cy;
    let ux = (a2 * (by - cy) + b2 * (cy - ay) + c2 * (ay - by)) / d;
    let uy = (a2 * (cx - bx) + b2 * (ax - cx) + c2 * (bx - ax)) / d;
    let r = ((ax - ux).powi(2) + (ay - uy).powi(2)).sqrt();
    (ux as f32, uy as f32, r as f32)
}

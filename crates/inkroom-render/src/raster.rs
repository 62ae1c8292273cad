//! Coverage masks and source-over compositing onto RGBA pixels.
//!
//! Shapes accumulate per-pixel coverage (max, not sum) into a mask, then the
//! mask is composited once, so overlapping segments of one stroke do not
//! darken their joins.

use image::{Rgba, RgbaImage};
use kurbo::{BezPath, PathEl, Point, Rect, Shape};

const FILL_SUBSAMPLES: u32 = 5;
const FLATTEN_TOLERANCE: f64 = 0.05;

/// Distance from `p` to the segment `a`..`b`.
pub fn distance_to_segment(p: Point, a: Point, b: Point) -> f64 {
    let d = b - a;
    let len_sq = d.hypot2();
    if len_sq < f64::EPSILON {
        return p.distance(a);
    }
    let t = ((p - a).dot(d) / len_sq).clamp(0.0, 1.0);
    p.distance(a + d * t)
}

/// A non-horizontal line of a flattened outline, stored top to bottom.
#[derive(Debug, Clone, Copy)]
struct Edge {
    top: Point,
    bottom: Point,
    winding: i32,
}

impl Edge {
    fn new(a: Point, b: Point) -> Option<Self> {
        if a.y == b.y {
            return None;
        }
        Some(if a.y < b.y {
            Self { top: a, bottom: b, winding: 1 }
        } else {
            Self { top: b, bottom: a, winding: -1 }
        })
    }

    /// Where a horizontal scanline at `y` crosses the edge, with its winding.
    fn crossing(&self, y: f64) -> Option<(f64, i32)> {
        if y < self.top.y || y >= self.bottom.y {
            return None;
        }
        let t = (y - self.top.y) / (self.bottom.y - self.top.y);
        Some((self.top.x + t * (self.bottom.x - self.top.x), self.winding))
    }
}

fn flatten_edges(path: &BezPath) -> Vec<Edge> {
    let mut edges = Vec::new();
    let mut start = Point::ZERO;
    let mut last = Point::ZERO;
    kurbo::flatten(path.elements().iter().copied(), FLATTEN_TOLERANCE, |el| match el {
        PathEl::MoveTo(p) => {
            edges.extend(Edge::new(last, start));
            start = p;
            last = p;
        }
        PathEl::LineTo(p) => {
            edges.extend(Edge::new(last, p));
            last = p;
        }
        PathEl::ClosePath => {
            edges.extend(Edge::new(last, start));
            last = start;
        }
        _ => {}
    });
    edges.extend(Edge::new(last, start));
    edges
}

/// Coverage in [0, 1] over a clipped pixel window of an image.
#[derive(Debug, Clone)]
pub struct CoverageMask {
    x0: u32,
    y0: u32,
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl CoverageMask {
    /// Mask over the pixels `bounds` touches, clipped to the image. `None` if
    /// nothing is visible.
    pub fn for_bounds(bounds: Rect, image_width: u32, image_height: u32) -> Option<Self> {
        let x0 = bounds.x0.floor().max(0.0);
        let y0 = bounds.y0.floor().max(0.0);
        let x1 = bounds.x1.ceil().min(image_width as f64);
        let y1 = bounds.y1.ceil().min(image_height as f64);
        if !(x1 > x0 && y1 > y0) {
            return None;
        }
        let (width, height) = ((x1 - x0) as u32, (y1 - y0) as u32);
        Some(Self {
            x0: x0 as u32,
            y0: y0 as u32,
            width,
            height,
            data: vec![0.0; (width * height) as usize],
        })
    }

    /// Coverage at an image pixel, zero outside the window.
    pub fn get(&self, x: u32, y: u32) -> f32 {
        if x < self.x0 || y < self.y0 || x >= self.x0 + self.width || y >= self.y0 + self.height {
            return 0.0;
        }
        self.data[((y - self.y0) * self.width + (x - self.x0)) as usize]
    }

    fn accumulate(&mut self, region: Rect, coverage: impl Fn(Point) -> f64) {
        let x_start = (region.x0.floor().max(self.x0 as f64) as u32).max(self.x0);
        let y_start = (region.y0.floor().max(self.y0 as f64) as u32).max(self.y0);
        let x_end = (region.x1.ceil().max(0.0) as u32).min(self.x0 + self.width);
        let y_end = (region.y1.ceil().max(0.0) as u32).min(self.y0 + self.height);
        for y in y_start..y_end {
            for x in x_start..x_end {
                let c = coverage(Point::new(x as f64, y as f64)) as f32;
                if c > 0.0 {
                    let idx = ((y - self.y0) * self.width + (x - self.x0)) as usize;
                    self.data[idx] = self.data[idx].max(c.min(1.0));
                }
            }
        }
    }

    /// A round-capped line of half-width `radius`, with a one-pixel ramp at
    /// the edge. `a == b` gives a disc.
    pub fn add_capsule(&mut self, a: Point, b: Point, radius: f64) {
        let pad = radius + 1.0;
        let region = Rect::from_points(a, b).inflate(pad, pad);
        self.accumulate(region, |pixel| {
            let center = Point::new(pixel.x + 0.5, pixel.y + 0.5);
            (radius + 0.5 - distance_to_segment(center, a, b)).clamp(0.0, 1.0)
        });
    }

    /// Fill a closed outline with the non-zero winding rule. Open subpaths
    /// are closed implicitly. Each pixel row is sampled on
    /// `FILL_SUBSAMPLES` scanlines with exact horizontal span coverage.
    pub fn fill_path(&mut self, path: &BezPath) {
        let edges = flatten_edges(path);
        if edges.is_empty() {
            return;
        }
        let bounds = path.bounding_box();
        let y_start = (bounds.y0.floor().max(self.y0 as f64) as u32).max(self.y0);
        let y_end = (bounds.y1.ceil().max(0.0) as u32).min(self.y0 + self.height);
        let weight = 1.0 / FILL_SUBSAMPLES as f64;

        let mut row = vec![0.0f64; self.width as usize];
        let mut crossings: Vec<(f64, i32)> = Vec::new();
        for y in y_start..y_end {
            row.fill(0.0);
            for s in 0..FILL_SUBSAMPLES {
                let sample_y = y as f64 + (s as f64 + 0.5) * weight;
                crossings.clear();
                crossings.extend(edges.iter().filter_map(|e| e.crossing(sample_y)));
                crossings.sort_by(|a, b| a.0.total_cmp(&b.0));

                let mut winding = 0;
                for pair in crossings.windows(2) {
                    winding += pair[0].1;
                    if winding != 0 {
                        self.add_span(&mut row, pair[0].0, pair[1].0, weight);
                    }
                }
            }
            let offset = ((y - self.y0) * self.width) as usize;
            for (cell, &c) in self.data[offset..offset + row.len()].iter_mut().zip(&row) {
                if c > 0.0 {
                    *cell = cell.max((c as f32).min(1.0));
                }
            }
        }
    }

    /// Adds `weight` times the covered length of `xa..xb` to each cell of `row`.
    fn add_span(&self, row: &mut [f64], xa: f64, xb: f64, weight: f64) {
        let left = self.x0 as f64;
        let xa = xa.max(left);
        let xb = xb.min(left + self.width as f64);
        if xb <= xa {
            return;
        }
        let first = xa.floor() as u32;
        let last = xb.ceil() as u32;
        for px in first..last {
            let overlap = xb.min(px as f64 + 1.0) - xa.max(px as f64);
            if overlap > 0.0 {
                row[(px - self.x0) as usize] += overlap * weight;
            }
        }
    }

    /// Blend `color` over the image, scaled by coverage.
    pub fn composite(&self, image: &mut RgbaImage, color: Rgba<u8>) {
        for row in 0..self.height {
            for col in 0..self.width {
                let coverage = self.data[(row * self.width + col) as usize];
                if coverage <= 0.0 {
                    continue;
                }
                let (x, y) = (self.x0 + col, self.y0 + row);
                if x < image.width() && y < image.height() {
                    let dst = image.get_pixel_mut(x, y);
                    *dst = blend_over(*dst, color, coverage);
                }
            }
        }
    }
}

/// Source-over with straight (non-premultiplied) alpha.
pub fn blend_over(dst: Rgba<u8>, src: Rgba<u8>, coverage: f32) -> Rgba<u8> {
    let sa = src.0[3] as f32 / 255.0 * coverage;
    let da = dst.0[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    if out_a <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }
    let channel = |i: usize| {
        let s = src.0[i] as f32;
        let d = dst.0[i] as f32;
        ((s * sa + d * da * (1.0 - sa)) / out_a).round().clamp(0.0, 255.0) as u8
    };
    Rgba([
        channel(0),
        channel(1),
        channel(2),
        (out_a * 255.0).round().clamp(0.0, 255.0) as u8,
    ])
}

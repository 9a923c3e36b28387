//! Contours, minimal-area rotated rectangles and axis alignment of masks.
//!
//! Everything the measurer needs from "a vision library" goes through
//! [`MaskGeometry`]. [`PolygonGeometry`] is a small deterministic
//! implementation; heavier backends can be plugged in by implementing the
//! trait.
//!
//! Coordinates are continuous image coordinates where pixel `(x, y)` covers
//! the unit square `[x, x + 1) × [y, y + 1)`, x to the right and y down.

use crate::{Mask, PixelBounds};
use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

/// Minimal rotated rectangle around a contour.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrientedBox {
    pub center: Point2<f64>,
    /// Extent along the `angle_deg` direction.
    pub width: f64,
    /// Extent along the perpendicular direction.
    pub height: f64,
    /// Direction of the `width` side in degrees, always in `[0, 90)`.
    pub angle_deg: f64,
}

impl OrientedBox {
    /// Longer side.
    #[inline]
    pub fn length(&self) -> f64 {
        self.width.max(self.height)
    }

    /// Shorter side.
    #[inline]
    pub fn depth(&self) -> f64 {
        self.width.min(self.height)
    }

    /// Direction of the longer side in degrees.
    #[inline]
    pub fn long_axis_deg(&self) -> f64 {
        if self.width < self.height {
            self.angle_deg + 90.0
        } else {
            self.angle_deg
        }
    }

    /// Corner points in drawing order.
    pub fn corners(&self) -> [Point2<f64>; 4] {
        let (s, c) = snapped_sin_cos(self.angle_deg);
        let u = Vector2::new(c, s) * (0.5 * self.width);
        let v = Vector2::new(-s, c) * (0.5 * self.height);
        let p = self.center;
        [p - u - v, p + u - v, p + u + v, p - u + v]
    }
}

/// Outer boundary of one 8-connected blob.
#[derive(Clone, Debug, PartialEq)]
pub struct Contour {
    /// Boundary pixels in integer pixel coordinates.
    pub points: Vec<Point2<i32>>,
    /// Area used to rank contours, in pixels.
    pub area: f64,
    pub bounds: PixelBounds,
}

/// Geometry operations the measurer depends on.
pub trait MaskGeometry {
    /// External contours of the binarized mask (holes are ignored).
    fn external_contours(&self, mask: &Mask) -> Vec<Contour>;

    /// Resample `mask` with nearest-neighbour interpolation so that the
    /// direction `axis_deg` through `center` becomes horizontal.
    ///
    /// The output keeps the input dimensions; content rotated outside the
    /// frame is lost.
    fn align_to_axis(&self, mask: &Mask, center: Point2<f64>, axis_deg: f64) -> Mask;

    /// Minimal-area rectangle covering the pixel squares of `contour`.
    fn min_area_rect(&self, contour: &Contour) -> Option<OrientedBox> {
        min_area_rect_of_points(&pixel_square_corners(&contour.points))
    }

    /// Contour with the largest area; the first one wins on ties.
    fn largest_contour(&self, mask: &Mask) -> Option<Contour> {
        let mut best: Option<Contour> = None;
        for c in self.external_contours(mask) {
            match &best {
                Some(b) if c.area <= b.area => {}
                _ => best = Some(c),
            }
        }
        best
    }
}

/// Pure-Rust backend: 8-connected labelling plus convex-hull rotating calipers.
#[derive(Clone, Copy, Debug, Default)]
pub struct PolygonGeometry;

const NEIGHBORS_8: [(i64, i64); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

const NEIGHBORS_4: [(i64, i64); 4] = [(0, -1), (-1, 0), (1, 0), (0, 1)];

impl MaskGeometry for PolygonGeometry {
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", skip_all, fields(width = mask.width, height = mask.height))
    )]
    fn external_contours(&self, mask: &Mask) -> Vec<Contour> {
        let (w, h) = (mask.width, mask.height);
        let mut visited = vec![false; w * h];
        let mut stack = Vec::new();
        let mut out = Vec::new();

        for y in 0..h {
            for x in 0..w {
                if visited[y * w + x] || !mask.is_set(x, y) {
                    continue;
                }
                visited[y * w + x] = true;
                stack.push((x, y));

                let mut points = Vec::new();
                let mut area = 0usize;
                let mut bounds = PixelBounds {
                    x0: x,
                    y0: y,
                    x1: x,
                    y1: y,
                };

                while let Some((cx, cy)) = stack.pop() {
                    area += 1;
                    bounds.include(cx, cy);
                    let (ix, iy) = (cx as i64, cy as i64);
                    if NEIGHBORS_4
                        .iter()
                        .any(|&(dx, dy)| !mask.is_set_i(ix + dx, iy + dy))
                    {
                        points.push(Point2::new(cx as i32, cy as i32));
                    }
                    for &(dx, dy) in &NEIGHBORS_8 {
                        let (nx, ny) = (ix + dx, iy + dy);
                        if !mask.is_set_i(nx, ny) {
                            continue;
                        }
                        let idx = ny as usize * w + nx as usize;
                        if !visited[idx] {
                            visited[idx] = true;
                            stack.push((nx as usize, ny as usize));
                        }
                    }
                }

                out.push(Contour {
                    points,
                    area: area as f64,
                    bounds,
                });
            }
        }
        out
    }

    fn align_to_axis(&self, mask: &Mask, center: Point2<f64>, axis_deg: f64) -> Mask {
        let mut out = Mask::new(mask.width, mask.height);
        let (s, c) = snapped_sin_cos(axis_deg);
        for y in 0..mask.height {
            let qy = y as f64 + 0.5 - center.y;
            for x in 0..mask.width {
                let qx = x as f64 + 0.5 - center.x;
                let px = center.x + c * qx - s * qy;
                let py = center.y + s * qx + c * qy;
                // Bias keeps exact half-pixel landings from flickering between neighbours.
                let sx = (px + SAMPLE_BIAS).floor() as i64;
                let sy = (py + SAMPLE_BIAS).floor() as i64;
                if mask.is_set_i(sx, sy) {
                    out.set(x, y, true);
                }
            }
        }
        out
    }
}

const SAMPLE_BIAS: f64 = 1e-7;

/// `(sin, cos)` of an angle in degrees, exact at multiples of 90°.
fn snapped_sin_cos(deg: f64) -> (f64, f64) {
    let quarter = deg / 90.0;
    let k = quarter.round();
    if (quarter - k).abs() < 1e-12 {
        match (k as i64).rem_euclid(4) {
            0 => (0.0, 1.0),
            1 => (1.0, 0.0),
            2 => (0.0, -1.0),
            _ => (-1.0, 0.0),
        }
    } else {
        deg.to_radians().sin_cos()
    }
}

/// The four corners of every pixel square in `points`.
pub fn pixel_square_corners(points: &[Point2<i32>]) -> Vec<Point2<f64>> {
    let mut out = Vec::with_capacity(points.len() * 4);
    for p in points {
        let (x, y) = (p.x as f64, p.y as f64);
        out.push(Point2::new(x, y));
        out.push(Point2::new(x + 1.0, y));
        out.push(Point2::new(x, y + 1.0));
        out.push(Point2::new(x + 1.0, y + 1.0));
    }
    out
}

#[inline]
fn cross(o: &Point2<f64>, a: &Point2<f64>, b: &Point2<f64>) -> f64 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

/// Convex hull (Andrew's monotone chain), collinear points dropped.
pub fn convex_hull(points: &[Point2<f64>]) -> Vec<Point2<f64>> {
    let mut pts: Vec<Point2<f64>> = points.to_vec();
    pts.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
    pts.dedup();
    if pts.len() < 3 {
        return pts;
    }

    let mut hull: Vec<Point2<f64>> = Vec::with_capacity(pts.len() * 2);
    for p in &pts {
        while hull.len() >= 2 && cross(&hull[hull.len() - 2], &hull[hull.len() - 1], p) <= 0.0 {
            hull.pop();
        }
        hull.push(*p);
    }
    let lower_len = hull.len() + 1;
    for p in pts.iter().rev().skip(1) {
        while hull.len() >= lower_len
            && cross(&hull[hull.len() - 2], &hull[hull.len() - 1], p) <= 0.0
        {
            hull.pop();
        }
        hull.push(*p);
    }
    hull.pop();
    hull
}

/// Minimal-area enclosing rectangle via rotating calipers over the hull edges.
pub fn min_area_rect_of_points(points: &[Point2<f64>]) -> Option<OrientedBox> {
    let hull = convex_hull(points);
    let first = *hull.first()?;
    if hull.len() == 1 {
        return Some(OrientedBox {
            center: first,
            width: 0.0,
            height: 0.0,
            angle_deg: 0.0,
        });
    }

    // (area, u, v, min_u, max_u, min_v, max_v)
    let mut best: Option<(f64, Vector2<f64>, Vector2<f64>, f64, f64, f64, f64)> = None;
    for i in 0..hull.len() {
        let edge = hull[(i + 1) % hull.len()] - hull[i];
        let len = edge.norm();
        if len < 1e-12 {
            continue;
        }
        let u = edge / len;
        let v = Vector2::new(-u.y, u.x);

        let (mut min_u, mut max_u) = (f64::INFINITY, f64::NEG_INFINITY);
        let (mut min_v, mut max_v) = (f64::INFINITY, f64::NEG_INFINITY);
        for p in &hull {
            let pu = p.coords.dot(&u);
            let pv = p.coords.dot(&v);
            min_u = min_u.min(pu);
            max_u = max_u.max(pu);
            min_v = min_v.min(pv);
            max_v = max_v.max(pv);
        }

        let area = (max_u - min_u) * (max_v - min_v);
        let better = match best {
            None => true,
            Some((best_area, ..)) => area < best_area - 1e-9,
        };
        if better {
            best = Some((area, u, v, min_u, max_u, min_v, max_v));
        }
    }

    let (_, u, v, min_u, max_u, min_v, max_v) = best?;
    let center = Point2::from(u * (0.5 * (min_u + max_u)) + v * (0.5 * (min_v + max_v)));
    let mut width = max_u - min_u;
    let mut height = max_v - min_v;

    let mut angle = u.y.atan2(u.x).to_degrees().rem_euclid(180.0);
    if angle >= 180.0 {
        angle = 0.0;
    }
    if angle >= 90.0 {
        angle -= 90.0;
        std::mem::swap(&mut width, &mut height);
    }

    Some(OrientedBox {
        center,
        width,
        height,
        angle_deg: angle,
    })
}

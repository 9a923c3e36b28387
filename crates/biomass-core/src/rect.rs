use serde::{Deserialize, Serialize};

use crate::PixelBounds;

/// Axis-aligned rectangle in normalized image coordinates (`[0, 1]` on both axes).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NormRect {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl NormRect {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Normalize inclusive pixel bounds against an image of `width × height`.
    pub fn from_pixel_bounds(b: &PixelBounds, width: usize, height: usize) -> Self {
        let w = width.max(1) as f32;
        let h = height.max(1) as f32;
        Self {
            x1: b.x0 as f32 / w,
            y1: b.y0 as f32 / h,
            x2: (b.x1 + 1) as f32 / w,
            y2: (b.y1 + 1) as f32 / h,
        }
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    #[inline]
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Scale back to pixel coordinates `[left, top, right, bottom]`.
    pub fn to_pixels(&self, width: usize, height: usize) -> [f32; 4] {
        let w = width as f32;
        let h = height as f32;
        [self.x1 * w, self.y1 * h, self.x2 * w, self.y2 * h]
    }

    /// Intersection-over-union. Disjoint or degenerate pairs give `0.0`.
    pub fn iou(&self, other: &NormRect) -> f32 {
        let left = self.x1.max(other.x1);
        let top = self.y1.max(other.y1);
        let right = self.x2.min(other.x2);
        let bottom = self.y2.min(other.y2);
        if right < left || bottom < top {
            return 0.0;
        }
        let inter = (right - left) * (bottom - top);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            return 0.0;
        }
        inter / union
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn identical_rects_have_unit_iou() {
        let r = NormRect::new(0.1, 0.2, 0.5, 0.6);
        assert_relative_eq!(r.iou(&r), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn disjoint_rects_have_zero_iou() {
        let a = NormRect::new(0.0, 0.0, 0.2, 0.2);
        let b = NormRect::new(0.5, 0.5, 0.9, 0.9);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn half_overlap() {
        let a = NormRect::new(0.0, 0.0, 0.4, 0.2);
        let b = NormRect::new(0.2, 0.0, 0.6, 0.2);
        // inter = 0.2*0.2, union = 0.08 + 0.08 - 0.04
        assert_relative_eq!(a.iou(&b), 0.04 / 0.12, epsilon = 1e-6);
    }

    #[test]
    fn pixel_bounds_are_normalized_exclusive() {
        let b = PixelBounds {
            x0: 10,
            y0: 0,
            x1: 19,
            y1: 49,
        };
        let r = NormRect::from_pixel_bounds(&b, 100, 100);
        assert_relative_eq!(r.x1, 0.1);
        assert_relative_eq!(r.x2, 0.2);
        assert_relative_eq!(r.y2, 0.5);
    }
}

//! `image` / `imageproc` integration: mask conversion, an `imageproc`-backed
//! [`MaskGeometry`], and overlay rasterization.

use biomass_core::{Contour, FrameView, Mask, MaskGeometry, PixelBounds};
use image::{GrayImage, Luma, RgbImage, Rgba, RgbaImage};
use imageproc::contours::{find_contours, BorderType};
use imageproc::drawing::draw_line_segment_mut;
use imageproc::geometric_transformations::{rotate, Interpolation};
use nalgebra::Point2;

use crate::{OverlayScene, Rgb};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Opacity of mask tints, out of 255.
pub const TINT_ALPHA: u16 = 96;

/// Binarize a grayscale mask image (any non-zero pixel is occupied).
pub fn mask_from_gray(img: &GrayImage) -> Mask {
    let (w, h) = (img.width() as usize, img.height() as usize);
    let data = img.as_raw().iter().map(|&v| if v > 0 { 255 } else { 0 }).collect();
    Mask::from_raw(w, h, data).unwrap_or_else(|| Mask::new(w, h))
}

/// Mask as a 0/255 grayscale image.
pub fn mask_to_gray(mask: &Mask) -> GrayImage {
    GrayImage::from_fn(mask.width as u32, mask.height as u32, |x, y| {
        Luma([if mask.is_set(x as usize, y as usize) { 255 } else { 0 }])
    })
}

/// Borrow an RGB image as a frame for the collaborators.
pub fn frame_view(img: &RgbImage) -> FrameView<'_> {
    FrameView {
        width: img.width() as usize,
        height: img.height() as usize,
        channels: 3,
        data: img.as_raw(),
    }
}

/// [`MaskGeometry`] backed by `imageproc` border following and rotation.
///
/// Contour area is the shoelace area of the border polygon, so single-pixel
/// and one-pixel-wide blobs rank as zero.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImageprocGeometry;

impl MaskGeometry for ImageprocGeometry {
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip_all, fields(width = mask.width, height = mask.height))
    )]
    fn external_contours(&self, mask: &Mask) -> Vec<Contour> {
        find_contours::<i32>(&mask_to_gray(mask))
            .into_iter()
            .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
            .filter_map(|c| {
                let points: Vec<Point2<i32>> =
                    c.points.iter().map(|p| Point2::new(p.x, p.y)).collect();
                let bounds = pixel_bounds(&points)?;
                Some(Contour {
                    area: shoelace_area(&points),
                    points,
                    bounds,
                })
            })
            .collect()
    }

    fn align_to_axis(&self, mask: &Mask, center: Point2<f64>, axis_deg: f64) -> Mask {
        // imageproc rotates clockwise and addresses pixels by their index,
        // not their square's corner.
        let rotated = rotate(
            &mask_to_gray(mask),
            ((center.x - 0.5) as f32, (center.y - 0.5) as f32),
            (-axis_deg).to_radians() as f32,
            Interpolation::Nearest,
            Luma([0u8]),
        );
        mask_from_gray(&rotated)
    }
}

fn pixel_bounds(points: &[Point2<i32>]) -> Option<PixelBounds> {
    let mut it = points.iter().filter(|p| p.x >= 0 && p.y >= 0);
    let first = it.next()?;
    let mut b = PixelBounds {
        x0: first.x as usize,
        y0: first.y as usize,
        x1: first.x as usize,
        y1: first.y as usize,
    };
    for p in it {
        b.include(p.x as usize, p.y as usize);
    }
    Some(b)
}

fn shoelace_area(points: &[Point2<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut twice = 0i64;
    for (i, p) in points.iter().enumerate() {
        let q = points[(i + 1) % points.len()];
        twice += i64::from(p.x) * i64::from(q.y) - i64::from(q.x) * i64::from(p.y);
    }
    (twice as f64).abs() / 2.0
}

#[inline]
fn blend(dst: u8, src: u8) -> u8 {
    ((u16::from(src) * TINT_ALPHA + u16::from(dst) * (255 - TINT_ALPHA)) / 255) as u8
}

/// Draw `scene` over `base`: mask tints first, then outlines.
#[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all))]
pub fn render_overlay(base: &RgbImage, scene: &OverlayScene) -> RgbaImage {
    let mut out = RgbaImage::from_fn(base.width(), base.height(), |x, y| {
        let [r, g, b] = base.get_pixel(x, y).0;
        Rgba([r, g, b, 255])
    });

    for shape in &scene.shapes {
        if let Some(mask) = &shape.mask {
            tint(&mut out, mask, shape.tint);
        }
    }
    for shape in &scene.shapes {
        if let Some(outline) = &shape.outline {
            let corners = outline.pixel_corners(scene.width, scene.height);
            draw_closed_polygon(&mut out, &corners, shape.stroke);
        }
    }
    out
}

fn tint(out: &mut RgbaImage, mask: &Mask, color: Rgb) {
    let w = mask.width.min(out.width() as usize);
    let h = mask.height.min(out.height() as usize);
    for y in 0..h {
        for x in 0..w {
            if !mask.is_set(x, y) {
                continue;
            }
            let px = out.get_pixel_mut(x as u32, y as u32);
            for c in 0..3 {
                px.0[c] = blend(px.0[c], color[c]);
            }
        }
    }
}

fn draw_closed_polygon(out: &mut RgbaImage, corners: &[Point2<f64>; 4], color: Rgb) {
    let stroke = Rgba([color[0], color[1], color[2], 255]);
    for i in 0..corners.len() {
        let a = corners[i];
        let b = corners[(i + 1) % corners.len()];
        for dy in [-1.0f32, 0.0, 1.0] {
            for dx in [-1.0f32, 0.0, 1.0] {
                draw_line_segment_mut(
                    out,
                    (a.x as f32 + dx, a.y as f32 + dy),
                    (b.x as f32 + dx, b.y as f32 + dy),
                    stroke,
                );
            }
        }
    }
}

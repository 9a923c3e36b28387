//! Core types and utilities for mask-based biomass estimation.
//!
//! This crate is intentionally small and purely geometric. It does *not*
//! depend on any image library or segmentation model: masks arrive as plain
//! occupancy grids and all contour / rotated-rectangle work goes through the
//! [`MaskGeometry`] seam.

mod collaborator;
mod frame;
mod geometry;
mod logger;
mod mask;
mod rect;

pub use collaborator::CollaboratorError;
pub use frame::{FrameError, FrameView};
pub use geometry::{
    convex_hull, min_area_rect_of_points, pixel_square_corners, Contour, MaskGeometry,
    OrientedBox, PolygonGeometry,
};
pub use mask::{Mask, PixelBounds};
pub use rect::NormRect;

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;

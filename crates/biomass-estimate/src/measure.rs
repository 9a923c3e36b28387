//! Mask → oriented box → per-column disk integration.
//!
//! Each column `x` of the axis-aligned mask is modelled as an ellipse whose
//! major diameter is the column height `h(x)`; the cross-section ratio
//! flattens it:
//!
//! ```text
//! pixel_volume = Σ h(x)² · π · ratio / 4
//! ```
//!
//! Measuring is split into a provisional pass (default ratio, used for
//! species matching) and a final pass with the species' own ratio.

use biomass_core::{Mask, MaskGeometry, NormRect, OrientedBox, PolygonGeometry};
use log::warn;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::{SpeciesAssignment, SpeciesCatalog, SpeciesProfile};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Cross-section ratio used before the species is known.
pub const DEFAULT_CROSS_SECTION_RATIO: f64 = 0.5;

/// Real-world size of one mask under a given scale and cross-section ratio.
///
/// `length_units >= depth_units` always holds.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub length_units: f64,
    pub depth_units: f64,
    pub volume_units: f64,
    /// Oriented-box corners in pixel coordinates, for drawing.
    pub corners: Option<[Point2<f64>; 4]>,
}

impl Measurement {
    pub const ZERO: Measurement = Measurement {
        length_units: 0.0,
        depth_units: 0.0,
        volume_units: 0.0,
        corners: None,
    };

    /// Degenerate measurements are excluded from aggregates.
    pub fn is_zero(&self) -> bool {
        self.corners.is_none()
            && self.length_units == 0.0
            && self.depth_units == 0.0
            && self.volume_units == 0.0
    }
}

impl Default for Measurement {
    fn default() -> Self {
        Self::ZERO
    }
}

/// Measures masks through a [`MaskGeometry`] backend.
#[derive(Clone, Debug)]
pub struct ShapeMeasurer<G = PolygonGeometry> {
    geometry: G,
    default_ratio: f64,
}

impl Default for ShapeMeasurer<PolygonGeometry> {
    fn default() -> Self {
        Self::new(PolygonGeometry)
    }
}

impl<G: MaskGeometry> ShapeMeasurer<G> {
    pub fn new(geometry: G) -> Self {
        Self {
            geometry,
            default_ratio: DEFAULT_CROSS_SECTION_RATIO,
        }
    }

    /// Override the ratio used by [`ShapeMeasurer::provisional`].
    pub fn with_default_ratio(mut self, ratio: f64) -> Self {
        self.default_ratio = ratio;
        self
    }

    #[inline]
    pub fn default_ratio(&self) -> f64 {
        self.default_ratio
    }

    /// One-shot measurement of the largest blob in `mask`.
    ///
    /// Returns [`Measurement::ZERO`] for an empty mask, a non-positive or
    /// non-finite scale, or a non-positive ratio. Ratios above 1 are clamped.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, mask), fields(w = mask.width, h = mask.height))
    )]
    pub fn measure(&self, mask: &Mask, ratio: f64, pixels_per_unit: f64) -> Measurement {
        let Some(ratio) = usable_ratio(ratio) else {
            return Measurement::ZERO;
        };
        if !usable_scale(pixels_per_unit) {
            return Measurement::ZERO;
        }
        match self.oriented_box(mask) {
            Some((oriented, _)) => {
                self.measure_aligned(mask, &oriented, ratio, pixels_per_unit)
            }
            None => Measurement::ZERO,
        }
    }

    /// First pass: measure with the default ratio and keep what species
    /// matching needs.
    pub fn provisional(&self, mask: &Mask, pixels_per_unit: f64) -> Option<ProvisionalMeasurement> {
        let ratio = usable_ratio(self.default_ratio)?;
        if !usable_scale(pixels_per_unit) {
            return None;
        }
        let (oriented, bounds) = self.oriented_box(mask)?;
        let measurement = self.measure_aligned(mask, &oriented, ratio, pixels_per_unit);
        Some(ProvisionalMeasurement {
            measurement,
            oriented,
            bounds,
            pixels_per_unit,
        })
    }

    /// Oriented box and normalized bounds of the largest contour.
    fn oriented_box(&self, mask: &Mask) -> Option<(OrientedBox, NormRect)> {
        if !mask.is_well_formed() {
            warn!(
                "mask buffer holds {} samples for {}x{}, treating it as empty",
                mask.data.len(),
                mask.width,
                mask.height
            );
            return None;
        }
        if mask.is_empty() {
            return None;
        }
        let contour = self.geometry.largest_contour(mask)?;
        let oriented = self.geometry.min_area_rect(&contour)?;
        if oriented.length() <= 0.0 {
            return None;
        }
        let bounds = NormRect::from_pixel_bounds(&contour.bounds, mask.width, mask.height);
        Some((oriented, bounds))
    }

    fn measure_aligned(
        &self,
        mask: &Mask,
        oriented: &OrientedBox,
        ratio: f64,
        pixels_per_unit: f64,
    ) -> Measurement {
        let aligned = self
            .geometry
            .align_to_axis(mask, oriented.center, oriented.long_axis_deg());
        let pixel_volume: f64 = aligned
            .column_sums()
            .into_iter()
            .map(|h| {
                let h = h as f64;
                h * h * PI * ratio / 4.0
            })
            .sum();

        Measurement {
            length_units: oriented.length() / pixels_per_unit,
            depth_units: oriented.depth() / pixels_per_unit,
            volume_units: pixel_volume / pixels_per_unit.powi(3),
            corners: Some(oriented.corners()),
        }
    }
}

fn usable_ratio(ratio: f64) -> Option<f64> {
    (ratio.is_finite() && ratio > 0.0).then(|| ratio.min(1.0))
}

fn usable_scale(pixels_per_unit: f64) -> bool {
    pixels_per_unit.is_finite() && pixels_per_unit > 0.0
}

/// Result of the first pass, before the species is known.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProvisionalMeasurement {
    /// Measured with the default ratio; only length/depth are final.
    pub measurement: Measurement,
    pub oriented: OrientedBox,
    /// Axis-aligned bounds of the measured contour, normalized to the mask.
    pub bounds: NormRect,
    pub pixels_per_unit: f64,
}

impl ProvisionalMeasurement {
    /// Second pass: re-integrate with the assigned species' ratio.
    ///
    /// The oriented box is reused; only the volume changes.
    pub fn finalize<G: MaskGeometry>(
        self,
        measurer: &ShapeMeasurer<G>,
        mask: &Mask,
        assignment: SpeciesAssignment,
        catalog: &SpeciesCatalog,
    ) -> FinalMeasurement {
        let profile = *catalog.lookup(&assignment.label);
        let measurement = match usable_ratio(profile.cross_section_ratio) {
            Some(ratio) => {
                measurer.measure_aligned(mask, &self.oriented, ratio, self.pixels_per_unit)
            }
            None => Measurement::ZERO,
        };
        FinalMeasurement {
            measurement,
            oriented: self.oriented,
            bounds: self.bounds,
            assignment,
            profile,
        }
    }
}

/// Measurement with the species-correct cross-section ratio.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FinalMeasurement {
    pub measurement: Measurement,
    pub oriented: OrientedBox,
    pub bounds: NormRect,
    pub assignment: SpeciesAssignment,
    pub profile: SpeciesProfile,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn axis_aligned_rectangle_integrates_columns() {
        let (w, h) = (30usize, 12usize);
        let mask = Mask::with_rect(64, 48, 10, 20, w, h);
        let m = ShapeMeasurer::default().measure(&mask, 1.0, 1.0);

        assert_relative_eq!(m.length_units, w as f64, epsilon = 1e-9);
        assert_relative_eq!(m.depth_units, h as f64, epsilon = 1e-9);
        let expected = w as f64 * (h * h) as f64 * PI / 4.0;
        assert_relative_eq!(m.volume_units, expected, max_relative = 1e-9);
        assert!(m.corners.is_some());
    }

    #[test]
    fn tall_rectangle_is_turned_on_its_side() {
        let mask = Mask::with_rect(80, 80, 30, 5, 10, 60);
        let m = ShapeMeasurer::default().measure(&mask, 1.0, 2.0);

        assert_relative_eq!(m.length_units, 30.0, epsilon = 1e-9);
        assert_relative_eq!(m.depth_units, 5.0, epsilon = 1e-9);
        let expected = 60.0 * 100.0 * PI / 4.0 / 8.0;
        assert_relative_eq!(m.volume_units, expected, max_relative = 1e-9);
    }

    #[test]
    fn end_to_end_reference_rectangle() {
        let mask = Mask::with_rect(160, 80, 20, 20, 100, 40);
        let m = ShapeMeasurer::default().measure(&mask, 0.5, 10.0);

        assert_relative_eq!(m.length_units, 10.0, epsilon = 1e-9);
        assert_relative_eq!(m.depth_units, 4.0, epsilon = 1e-9);
        assert_relative_eq!(m.volume_units, 62.831_853, epsilon = 1e-5);
    }

    #[test]
    fn malformed_mask_gives_zero() {
        let mask = Mask {
            width: 50,
            height: 50,
            data: vec![255; 10],
        };
        let measurer = ShapeMeasurer::default();
        assert!(measurer.measure(&mask, 0.5, 10.0).is_zero());
        assert!(measurer.provisional(&mask, 10.0).is_none());
    }

    #[test]
    fn degenerate_inputs_give_zero() {
        let measurer = ShapeMeasurer::default();
        let empty = Mask::new(20, 20);
        for ppu in [1.0, 10.0, 0.001] {
            assert_eq!(measurer.measure(&empty, 0.5, ppu), Measurement::ZERO);
        }

        let mask = Mask::with_rect(20, 20, 2, 2, 10, 5);
        for ppu in [0.0, -3.0, f64::NAN, f64::INFINITY] {
            assert_eq!(measurer.measure(&mask, 0.5, ppu), Measurement::ZERO);
        }
        for ratio in [0.0, -0.5, f64::NAN] {
            assert_eq!(measurer.measure(&mask, ratio, 1.0), Measurement::ZERO);
        }
        assert!(measurer.provisional(&empty, 1.0).is_none());
        assert!(measurer.provisional(&mask, 0.0).is_none());
    }

    #[test]
    fn ratio_above_one_is_clamped() {
        let measurer = ShapeMeasurer::default();
        let mask = Mask::with_rect(40, 40, 5, 5, 20, 8);
        assert_eq!(
            measurer.measure(&mask, 3.0, 1.0),
            measurer.measure(&mask, 1.0, 1.0)
        );
    }

    #[test]
    fn largest_blob_drives_the_box() {
        let mut mask = Mask::with_rect(100, 60, 5, 5, 50, 20);
        mask.fill_rect(80, 40, 6, 6);
        let m = ShapeMeasurer::default().measure(&mask, 1.0, 1.0);
        assert_relative_eq!(m.length_units, 50.0, epsilon = 1e-9);
        assert_relative_eq!(m.depth_units, 20.0, epsilon = 1e-9);
    }

    #[test]
    fn rotated_rectangle_matches_axis_aligned_within_discretization() {
        // 60 × 16 bar rotated by 30° around (64, 64).
        let (len, dep) = (60.0f64, 16.0f64);
        let (s, c) = 30f64.to_radians().sin_cos();
        let mut mask = Mask::new(128, 128);
        for y in 0..128 {
            for x in 0..128 {
                let dx = x as f64 + 0.5 - 64.0;
                let dy = y as f64 + 0.5 - 64.0;
                let u = c * dx + s * dy;
                let v = -s * dx + c * dy;
                if u.abs() <= len / 2.0 && v.abs() <= dep / 2.0 {
                    mask.set(x, y, true);
                }
            }
        }

        let m = ShapeMeasurer::default().measure(&mask, 1.0, 1.0);
        assert_relative_eq!(m.length_units, len, max_relative = 0.05);
        assert_relative_eq!(m.depth_units, dep, max_relative = 0.12);
        let expected = len * dep * dep * PI / 4.0;
        assert_relative_eq!(m.volume_units, expected, max_relative = 0.15);
    }

    #[test]
    fn finalize_reintegrates_with_species_ratio() {
        let measurer = ShapeMeasurer::default();
        let mask = Mask::with_rect(120, 60, 10, 10, 100, 40);
        let provisional = measurer.provisional(&mask, 10.0).expect("provisional");
        assert_relative_eq!(provisional.measurement.volume_units, 62.831_853, epsilon = 1e-5);
        assert_relative_eq!(provisional.bounds.x1, 10.0 / 120.0, epsilon = 1e-6);
        assert_relative_eq!(provisional.bounds.x2, 110.0 / 120.0, epsilon = 1e-6);

        let catalog = SpeciesCatalog::builtin();
        let assignment = SpeciesAssignment::unmatched("Catfish");
        let fin = provisional.finalize(&measurer, &mask, assignment, &catalog);
        // catfish ratio 0.8
        assert_relative_eq!(fin.measurement.volume_units, 62.831_853 * 1.6, epsilon = 1e-4);
        assert_relative_eq!(fin.measurement.length_units, 10.0, epsilon = 1e-9);
        assert_eq!(fin.profile.cross_section_ratio, 0.8);
    }
}

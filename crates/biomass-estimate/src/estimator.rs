use biomass_core::{Mask, MaskGeometry, NormRect, PolygonGeometry};
use log::debug;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::{
    DetectionBox, Measurement, ShapeMeasurer, SpeciesAssignment, SpeciesCatalog, SpeciesMatcher,
};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Species bucket used for bulk estimates.
pub const PILE_LABEL: &str = "Pile";

/// How an estimate was obtained.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    /// One segmented individual, weight from the allometric formula.
    Individual,
    /// Bulk heap approximated as a cone.
    Pile,
    /// Detector count times the species' average weight.
    Counted,
}

/// Weight and volume of one object (or one counted group).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectEstimate {
    pub measurement: Measurement,
    pub species: String,
    /// Grams.
    pub weight: f64,
    /// cm³.
    pub volume: f64,
    pub kind: ObjectKind,
    /// Individuals represented; `1` unless `kind` is `Counted`.
    pub count: u32,
    /// Normalized bounds of the measured blob, for overlay fallback.
    pub bounds: Option<NormRect>,
}

impl ObjectEstimate {
    /// Whether this estimate carries no usable geometry.
    pub fn is_degenerate(&self) -> bool {
        self.kind != ObjectKind::Counted && self.measurement.is_zero()
    }
}

/// `a · length^b`; zero for non-positive or non-finite lengths.
#[inline]
pub fn allometric_weight(a: f64, b: f64, length: f64) -> f64 {
    if !length.is_finite() || length <= 0.0 {
        return 0.0;
    }
    a * length.powf(b)
}

/// Volume of a right circular cone.
#[inline]
pub fn cone_volume(diameter: f64, height: f64) -> f64 {
    let r = diameter / 2.0;
    PI * r * r * height / 3.0
}

/// Turns masks (or counts) into weight and volume estimates.
#[derive(Clone, Debug)]
pub struct BiomassEstimator<G = PolygonGeometry> {
    measurer: ShapeMeasurer<G>,
    matcher: SpeciesMatcher,
    catalog: SpeciesCatalog,
}

impl Default for BiomassEstimator<PolygonGeometry> {
    fn default() -> Self {
        Self::new(
            ShapeMeasurer::default(),
            SpeciesMatcher::default(),
            SpeciesCatalog::builtin(),
        )
    }
}

impl<G: MaskGeometry> BiomassEstimator<G> {
    pub fn new(measurer: ShapeMeasurer<G>, matcher: SpeciesMatcher, catalog: SpeciesCatalog) -> Self {
        Self {
            measurer,
            matcher,
            catalog,
        }
    }

    #[inline]
    pub fn measurer(&self) -> &ShapeMeasurer<G> {
        &self.measurer
    }

    #[inline]
    pub fn catalog(&self) -> &SpeciesCatalog {
        &self.catalog
    }

    #[inline]
    pub fn matcher(&self) -> &SpeciesMatcher {
        &self.matcher
    }

    /// Two-pass estimate of one segmented individual.
    ///
    /// Provisional measurement with the default ratio, species assignment by
    /// overlap of `bounds` (the segmenter's box, or the measured contour's
    /// bounds when `None`) with `detections`, then the final measurement with
    /// the species ratio and `weight = a · length^b`.
    ///
    /// An unusable mask or scale yields a degenerate estimate with
    /// [`Measurement::ZERO`] and zero weight.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, mask, bounds, detections))
    )]
    pub fn estimate_individual(
        &self,
        mask: &Mask,
        origin_label: &str,
        bounds: Option<&NormRect>,
        detections: &[DetectionBox],
        pixels_per_unit: f64,
    ) -> ObjectEstimate {
        let provisional = self.measurer.provisional(mask, pixels_per_unit);
        let match_bounds = bounds.or(provisional.as_ref().map(|p| &p.bounds));
        let assignment = match match_bounds {
            Some(b) => self.matcher.assign(b, origin_label, detections),
            None => SpeciesAssignment::unmatched(origin_label),
        };

        let Some(provisional) = provisional else {
            debug!("{}: unusable mask or scale", assignment.label);
            return degenerate(assignment.label, ObjectKind::Individual, bounds.copied());
        };
        let fin = provisional.finalize(&self.measurer, mask, assignment, &self.catalog);
        let length = fin.measurement.length_units;
        let weight = allometric_weight(fin.profile.a, fin.profile.b, length);
        debug!(
            "{}: L={:.2} D={:.2} V={:.1} W={:.1}",
            fin.assignment.label,
            length,
            fin.measurement.depth_units,
            fin.measurement.volume_units,
            weight
        );
        ObjectEstimate {
            measurement: fin.measurement,
            species: fin.assignment.label,
            weight,
            volume: fin.measurement.volume_units,
            kind: ObjectKind::Individual,
            count: 1,
            bounds: Some(bounds.copied().unwrap_or(fin.bounds)),
        }
    }

    /// Cone estimate of a bulk heap: diameter = depth, height = length,
    /// density 1 g/cm³.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self, mask, bounds)))]
    pub fn estimate_pile(
        &self,
        mask: &Mask,
        bounds: Option<&NormRect>,
        pixels_per_unit: f64,
    ) -> ObjectEstimate {
        let Some(provisional) = self.measurer.provisional(mask, pixels_per_unit) else {
            debug!("pile: unusable mask or scale");
            return degenerate(PILE_LABEL.to_string(), ObjectKind::Pile, bounds.copied());
        };
        let mut measurement = provisional.measurement;
        let volume = cone_volume(measurement.depth_units, measurement.length_units);
        measurement.volume_units = volume;
        debug!(
            "pile: base {:.2} height {:.2} -> {:.1} cm3",
            measurement.depth_units, measurement.length_units, volume
        );
        ObjectEstimate {
            measurement,
            species: PILE_LABEL.to_string(),
            weight: volume,
            volume,
            kind: ObjectKind::Pile,
            count: 1,
            bounds: Some(bounds.copied().unwrap_or(provisional.bounds)),
        }
    }

    /// Count-mode estimates: `count × avg_weight` and `count × avg_volume`.
    pub fn estimate_counts<S: AsRef<str>>(&self, counts: &[(S, u32)]) -> Vec<ObjectEstimate> {
        estimate_counts(&self.catalog, counts)
    }
}

fn degenerate(species: String, kind: ObjectKind, bounds: Option<NormRect>) -> ObjectEstimate {
    ObjectEstimate {
        measurement: Measurement::ZERO,
        species,
        weight: 0.0,
        volume: 0.0,
        kind,
        count: 1,
        bounds,
    }
}

/// Count-mode estimates against `catalog`. Zero counts are skipped.
pub fn estimate_counts<S: AsRef<str>>(catalog: &SpeciesCatalog, counts: &[(S, u32)]) -> Vec<ObjectEstimate> {
    counts
        .iter()
        .filter(|(_, n)| *n > 0)
        .map(|(species, n)| {
            let profile = catalog.lookup(species.as_ref());
            let n_f = f64::from(*n);
            ObjectEstimate {
                measurement: Measurement::ZERO,
                species: species.as_ref().to_string(),
                weight: n_f * profile.avg_weight,
                volume: n_f * profile.avg_volume,
                kind: ObjectKind::Counted,
                count: *n,
                bounds: None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn allometric_weight_matches_formula() {
        assert_relative_eq!(allometric_weight(0.013, 3.05, 30.0), 0.013 * 30f64.powf(3.05));
        assert_eq!(allometric_weight(0.013, 3.05, 0.0), 0.0);
        assert_eq!(allometric_weight(0.013, 3.05, f64::NAN), 0.0);
    }

    #[test]
    fn cone_volume_of_unit_shapes() {
        assert_relative_eq!(cone_volume(2.0, 3.0), PI, epsilon = 1e-12);
        assert_eq!(cone_volume(0.0, 10.0), 0.0);
    }

    #[test]
    fn individual_uses_matched_species() {
        let estimator = BiomassEstimator::default();
        let mask = Mask::with_rect(200, 100, 50, 30, 100, 40);
        let detections = vec![DetectionBox::new(
            NormRect::new(0.25, 0.3, 0.75, 0.7),
            "Rohu",
            0.8,
        )];
        let est = estimator.estimate_individual(&mask, "Fish", None, &detections, 10.0);

        assert_eq!(est.species, "Rohu");
        assert_eq!(est.kind, ObjectKind::Individual);
        assert_relative_eq!(est.measurement.length_units, 10.0, epsilon = 1e-9);
        assert_relative_eq!(est.weight, 0.013 * 10f64.powf(3.05), max_relative = 1e-9);
        // rohu ratio 0.55 instead of the provisional 0.5
        assert_relative_eq!(est.volume, 62.831_853 * 1.1, epsilon = 1e-4);
    }

    #[test]
    fn unmatched_individual_uses_default_profile() {
        let estimator = BiomassEstimator::default();
        let mask = Mask::with_rect(200, 100, 50, 30, 100, 40);
        let est = estimator.estimate_individual(&mask, "Fish", None, &[], 10.0);
        assert_eq!(est.species, "Fish");
        assert_relative_eq!(est.weight, 0.012 * 1000.0, max_relative = 1e-9);
    }

    #[test]
    fn segmenter_box_drives_matching() {
        let estimator = BiomassEstimator::default();
        let mask = Mask::with_rect(200, 100, 50, 30, 100, 40);
        let seg_box = NormRect::new(0.0, 0.0, 0.2, 0.2);
        let detections = vec![DetectionBox::new(NormRect::new(0.0, 0.0, 0.2, 0.2), "Tuna", 0.5)];
        let est = estimator.estimate_individual(&mask, "Fish", Some(&seg_box), &detections, 10.0);
        assert_eq!(est.species, "Tuna");
        assert_eq!(est.bounds, Some(seg_box));
    }

    #[test]
    fn degenerate_masks_give_zero_estimates() {
        let estimator = BiomassEstimator::default();
        let seg_box = NormRect::new(0.1, 0.1, 0.4, 0.4);
        let detections = vec![DetectionBox::new(seg_box, "Hilsa", 0.7)];
        let empty = estimator.estimate_individual(&Mask::new(10, 10), "Fish", Some(&seg_box), &detections, 10.0);
        assert!(empty.is_degenerate());
        assert_eq!(empty.species, "Hilsa");
        assert_eq!(empty.weight, 0.0);
        assert_eq!(empty.bounds, Some(seg_box));

        let mask = Mask::with_rect(10, 10, 1, 1, 5, 5);
        assert!(estimator
            .estimate_individual(&mask, "Fish", None, &[], 0.0)
            .is_degenerate());
        let pile = estimator.estimate_pile(&mask, None, -1.0);
        assert!(pile.is_degenerate());
        assert_eq!(pile.species, PILE_LABEL);
    }

    #[test]
    fn pile_is_a_cone() {
        let estimator = BiomassEstimator::default();
        let mask = Mask::with_rect(300, 200, 10, 10, 200, 100);
        let est = estimator.estimate_pile(&mask, None, 10.0);
        assert_eq!(est.species, PILE_LABEL);
        assert_eq!(est.kind, ObjectKind::Pile);
        let expected = PI * 5.0 * 5.0 * 20.0 / 3.0;
        assert_relative_eq!(est.volume, expected, max_relative = 1e-9);
        assert_relative_eq!(est.weight, est.volume);
        assert_relative_eq!(est.measurement.volume_units, expected, max_relative = 1e-9);
    }

    #[test]
    fn counts_use_average_weight() {
        let estimator = BiomassEstimator::default();
        let est = estimator.estimate_counts(&[("Sardine", 12), ("Shrimp", 0), ("eel", 2)]);
        assert_eq!(est.len(), 2);
        assert_eq!(est[0].weight, 1200.0);
        assert_eq!(est[0].volume, 1140.0);
        assert_eq!(est[0].count, 12);
        assert_eq!(est[1].weight, 1000.0);
        assert!(!est[0].is_degenerate());
    }
}

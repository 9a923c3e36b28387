use biomass_core::Mask;
use biomass_estimate::{
    allometric_weight, AggregateResult, BiomassEstimator, Measurement, ObjectEstimate, ObjectKind,
    ShapeMeasurer, SpeciesCatalog,
};
use nalgebra::Point2;
use proptest::prelude::*;

const SPECIES: [&str; 5] = ["Rohu", "Tuna", "Sardine", "Mud Crab", "Fish"];

fn estimate(species: &str, weight: f64, volume: f64) -> ObjectEstimate {
    ObjectEstimate {
        measurement: Measurement {
            length_units: 1.0,
            depth_units: 1.0,
            volume_units: volume,
            corners: Some([Point2::origin(); 4]),
        },
        species: species.to_string(),
        weight,
        volume,
        kind: ObjectKind::Individual,
        count: 1,
        bounds: None,
    }
}

proptest! {
    #[test]
    fn allometric_weight_is_monotone_in_length(
        a in 0.001f64..1.0,
        b in 0.5f64..4.0,
        l1 in 0.1f64..200.0,
        dl in 0.001f64..50.0,
    ) {
        let l2 = l1 + dl;
        prop_assert!(allometric_weight(a, b, l2) > allometric_weight(a, b, l1));
    }

    #[test]
    fn builtin_profiles_are_monotone(l1 in 1.0f64..150.0, dl in 0.01f64..20.0) {
        let catalog = SpeciesCatalog::builtin();
        for (_, p) in catalog.iter() {
            prop_assert!(allometric_weight(p.a, p.b, l1 + dl) > allometric_weight(p.a, p.b, l1));
        }
    }

    #[test]
    fn species_sums_equal_totals(
        objects in prop::collection::vec((0usize..SPECIES.len(), 0.0f64..5000.0, 0.0f64..5000.0), 0..40)
    ) {
        let estimates: Vec<_> = objects
            .iter()
            .map(|&(s, w, v)| estimate(SPECIES[s], w, v))
            .collect();
        let agg = AggregateResult::from_objects(estimates, true);

        let weight: f64 = agg.species.iter().map(|s| s.total_weight).sum();
        let volume: f64 = agg.species.iter().map(|s| s.total_volume).sum();
        let count: u32 = agg.species.iter().map(|s| s.count).sum();
        prop_assert!((weight - agg.total_weight).abs() <= 1e-6 * agg.total_weight.max(1.0));
        prop_assert!((volume - agg.total_volume).abs() <= 1e-6 * agg.total_volume.max(1.0));
        prop_assert_eq!(count as usize, objects.len());
        for pair in agg.species.windows(2) {
            prop_assert!(pair[0].total_weight >= pair[1].total_weight);
        }
    }

    #[test]
    fn rectangle_length_never_below_depth(
        w in 1usize..60,
        h in 1usize..60,
        ppu in 0.5f64..20.0,
    ) {
        let mask = Mask::with_rect(64, 64, 2, 2, w, h);
        let m = ShapeMeasurer::default().measure(&mask, 0.5, ppu);
        prop_assert!(m.length_units >= m.depth_units);
        prop_assert!((m.length_units - w.max(h) as f64 / ppu).abs() < 1e-9);
        prop_assert!((m.depth_units - w.min(h) as f64 / ppu).abs() < 1e-9);
    }

    #[test]
    fn individual_weight_grows_with_mask_length(extra in 1usize..40) {
        let estimator = BiomassEstimator::default();
        let short = Mask::with_rect(128, 64, 4, 20, 40, 12);
        let long = Mask::with_rect(128, 64, 4, 20, 40 + extra, 12);
        let ws = estimator.estimate_individual(&short, "Sardine", None, &[], 5.0).weight;
        let wl = estimator.estimate_individual(&long, "Sardine", None, &[], 5.0).weight;
        prop_assert!(wl > ws);
    }
}

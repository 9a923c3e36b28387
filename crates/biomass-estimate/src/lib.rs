//! Mask measurement and biomass estimation.
//!
//! ```text
//! mask ──ShapeMeasurer::provisional──► ProvisionalMeasurement
//!                                         │  SpeciesMatcher::assign (IoU vs detections)
//!                                         ▼
//!                           ProvisionalMeasurement::finalize (species ratio)
//!                                         │
//!                                         ▼
//!          BiomassEstimator: a·L^b  |  cone (pile)  |  count × avg (counted)
//!                                         │
//!                                         ▼
//!                                  AggregateResult
//! ```
//!
//! All lengths are in the unit of the scale reference (centimetres in
//! practice), volumes in cubic units, weights in grams.

mod aggregate;
mod estimator;
mod matcher;
mod measure;
mod species;

pub use aggregate::{AggregateResult, SpeciesTotals};
pub use estimator::{
    allometric_weight, cone_volume, estimate_counts, BiomassEstimator, ObjectEstimate, ObjectKind,
    PILE_LABEL,
};
pub use matcher::{DetectionBox, SpeciesAssignment, SpeciesMatcher, DEFAULT_IOU_THRESHOLD};
pub use measure::{
    FinalMeasurement, Measurement, ProvisionalMeasurement, ShapeMeasurer,
    DEFAULT_CROSS_SECTION_RATIO,
};
pub use species::{CatalogError, SpeciesCatalog, SpeciesProfile, DEFAULT_PROFILE};

//! Scale calibration for biomass measurement.
//!
//! Two strategies turn pixels into real-world units:
//! - a reference coin of known diameter, segmented by an external model,
//! - a printed fiducial marker of known side length, found by an external
//!   [`FiducialDetector`] over a fixed, ordered list of dictionaries.
//!
//! When neither yields a reference the calibrator falls back to a documented
//! constant and flags the scale as uncalibrated; downstream results are then
//! estimates rather than measurements.

mod calibrator;
mod dictionary;
mod marker;

pub use calibrator::{
    Calibration, CalibrationError, CalibrationParams, ReferenceMethod, ScaleCalibrator,
    ScaleReference, DEFAULT_COIN_DIAMETER_CM, DEFAULT_FALLBACK_PX_PER_CM, DEFAULT_MARKER_SIZE_CM,
};
pub use dictionary::{MarkerDictionary, DEFAULT_SEARCH_ORDER};
pub use marker::{DetectedMarker, FiducialDetector};

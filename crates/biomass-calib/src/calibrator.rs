use biomass_core::{FrameView, Mask, MaskGeometry, OrientedBox, PolygonGeometry};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::{DetectedMarker, FiducialDetector, MarkerDictionary, DEFAULT_SEARCH_ORDER};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Diameter of the reference coin in centimetres.
pub const DEFAULT_COIN_DIAMETER_CM: f64 = 2.7;
/// Printed marker side length in centimetres.
pub const DEFAULT_MARKER_SIZE_CM: f64 = 4.5;
/// Scale assumed when no reference is visible.
pub const DEFAULT_FALLBACK_PX_PER_CM: f64 = 50.0;

/// Which reference object provides the scale.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceMethod {
    Coin,
    ArucoMarker,
}

/// Pixels per real-world unit for one analysis run.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScaleReference {
    pub pixels_per_unit: f64,
    pub method: ReferenceMethod,
    /// `false` when the fallback constant is in use.
    pub calibrated: bool,
}

impl ScaleReference {
    pub fn fallback(method: ReferenceMethod, pixels_per_unit: f64) -> Self {
        Self {
            pixels_per_unit,
            method,
            calibrated: false,
        }
    }
}

/// Errors returned when building a calibrator.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("{what} must be positive and finite (got {value})")]
    InvalidReferenceSize { what: &'static str, value: f64 },
    #[error("marker calibration needs at least one dictionary")]
    NoDictionaries,
}

fn default_dictionaries() -> Vec<MarkerDictionary> {
    DEFAULT_SEARCH_ORDER.to_vec()
}

fn default_coin_diameter() -> f64 {
    DEFAULT_COIN_DIAMETER_CM
}

fn default_marker_size() -> f64 {
    DEFAULT_MARKER_SIZE_CM
}

fn default_fallback() -> f64 {
    DEFAULT_FALLBACK_PX_PER_CM
}

/// Calibration settings. Exactly one `method` is active.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationParams {
    pub method: ReferenceMethod,
    #[serde(default = "default_coin_diameter")]
    pub coin_diameter_units: f64,
    #[serde(default = "default_marker_size")]
    pub marker_size_units: f64,
    #[serde(default = "default_fallback")]
    pub fallback_pixels_per_unit: f64,
    /// Search order for marker calibration.
    #[serde(default = "default_dictionaries")]
    pub dictionaries: Vec<MarkerDictionary>,
}

impl Default for CalibrationParams {
    fn default() -> Self {
        Self {
            method: ReferenceMethod::ArucoMarker,
            coin_diameter_units: DEFAULT_COIN_DIAMETER_CM,
            marker_size_units: DEFAULT_MARKER_SIZE_CM,
            fallback_pixels_per_unit: DEFAULT_FALLBACK_PX_PER_CM,
            dictionaries: default_dictionaries(),
        }
    }
}

impl CalibrationParams {
    pub fn coin() -> Self {
        Self {
            method: ReferenceMethod::Coin,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), CalibrationError> {
        for (what, value) in [
            ("coin diameter", self.coin_diameter_units),
            ("marker size", self.marker_size_units),
            ("fallback scale", self.fallback_pixels_per_unit),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(CalibrationError::InvalidReferenceSize { what, value });
            }
        }
        if self.method == ReferenceMethod::ArucoMarker && self.dictionaries.is_empty() {
            return Err(CalibrationError::NoDictionaries);
        }
        Ok(())
    }
}

/// Outcome of one calibration attempt.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub scale: ScaleReference,
    /// Oriented box of the reference coin, if one was measured.
    pub coin: Option<OrientedBox>,
    /// Dictionary that produced `markers`.
    pub dictionary: Option<MarkerDictionary>,
    pub markers: Vec<DetectedMarker>,
}

impl Calibration {
    fn uncalibrated(scale: ScaleReference) -> Self {
        Self {
            scale,
            coin: None,
            dictionary: None,
            markers: Vec::new(),
        }
    }
}

/// Derives pixels-per-unit from a reference coin mask or fiducial markers.
#[derive(Clone, Debug)]
pub struct ScaleCalibrator<G = PolygonGeometry> {
    params: CalibrationParams,
    geometry: G,
}

impl ScaleCalibrator<PolygonGeometry> {
    pub fn new(params: CalibrationParams) -> Result<Self, CalibrationError> {
        Self::with_geometry(params, PolygonGeometry)
    }
}

impl<G: MaskGeometry> ScaleCalibrator<G> {
    pub fn with_geometry(params: CalibrationParams, geometry: G) -> Result<Self, CalibrationError> {
        params.validate()?;
        Ok(Self { params, geometry })
    }

    #[inline]
    pub fn params(&self) -> &CalibrationParams {
        &self.params
    }

    /// Scale used when the reference cannot be found.
    pub fn fallback(&self) -> ScaleReference {
        ScaleReference::fallback(self.params.method, self.params.fallback_pixels_per_unit)
    }

    /// Run the configured method.
    ///
    /// `coin_mask` is only read for [`ReferenceMethod::Coin`], `detector` only
    /// for [`ReferenceMethod::ArucoMarker`].
    pub fn calibrate(
        &self,
        frame: &FrameView<'_>,
        coin_mask: Option<&Mask>,
        detector: Option<&dyn FiducialDetector>,
    ) -> Calibration {
        match self.params.method {
            ReferenceMethod::Coin => self.calibrate_coin(coin_mask),
            ReferenceMethod::ArucoMarker => match detector {
                Some(detector) => self.calibrate_marker(frame, detector),
                None => {
                    warn!("no fiducial detector configured, using fallback scale");
                    Calibration::uncalibrated(self.fallback())
                }
            },
        }
    }

    /// Scale from the coin's oriented box: `max(width, height) / diameter`.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all))]
    pub fn calibrate_coin(&self, mask: Option<&Mask>) -> Calibration {
        let coin = mask.and_then(|m| {
            let contour = self.geometry.largest_contour(m)?;
            self.geometry.min_area_rect(&contour)
        });
        let Some(coin) = coin.filter(|b| b.length() > 0.0) else {
            warn!("reference coin not found, using fallback scale");
            return Calibration::uncalibrated(ScaleReference::fallback(
                ReferenceMethod::Coin,
                self.params.fallback_pixels_per_unit,
            ));
        };

        let diameter_px = coin.length();
        let pixels_per_unit = diameter_px / self.params.coin_diameter_units;
        debug!(
            "coin diameter {:.1}px -> {:.3} px/unit",
            diameter_px, pixels_per_unit
        );
        Calibration {
            scale: ScaleReference {
                pixels_per_unit,
                method: ReferenceMethod::Coin,
                calibrated: true,
            },
            coin: Some(coin),
            dictionary: None,
            markers: Vec::new(),
        }
    }

    /// Scale from the first marker of the first dictionary that yields any.
    ///
    /// Dictionaries are not merged: later ones are never queried once a
    /// marker has been found. A failing dictionary counts as "no markers".
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all))]
    pub fn calibrate_marker(
        &self,
        frame: &FrameView<'_>,
        detector: &dyn FiducialDetector,
    ) -> Calibration {
        for &dictionary in &self.params.dictionaries {
            let markers = match detector.detect_markers(frame, dictionary) {
                Ok(markers) => markers,
                Err(err) => {
                    warn!("marker detection with {} failed: {err}", dictionary.name());
                    continue;
                }
            };
            let Some(first) = markers.first() else {
                continue;
            };

            let width_px = first.side_px();
            if !width_px.is_finite() || width_px <= 0.0 {
                warn!(
                    "marker {} in {} is degenerate, using fallback scale",
                    first.id,
                    dictionary.name()
                );
                break;
            }
            let pixels_per_unit = width_px / self.params.marker_size_units;
            debug!(
                "{} marker(s) in {}, side {:.1}px -> {:.3} px/unit",
                markers.len(),
                dictionary.name(),
                width_px,
                pixels_per_unit
            );
            return Calibration {
                scale: ScaleReference {
                    pixels_per_unit,
                    method: ReferenceMethod::ArucoMarker,
                    calibrated: true,
                },
                coin: None,
                dictionary: Some(dictionary),
                markers,
            };
        }

        warn!("no fiducial marker found, using fallback scale");
        Calibration::uncalibrated(ScaleReference::fallback(
            ReferenceMethod::ArucoMarker,
            self.params.fallback_pixels_per_unit,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use biomass_core::CollaboratorError;
    use nalgebra::Point2;
    use std::sync::Mutex;

    /// Returns canned markers per dictionary and records the query order.
    struct ScriptedDetector {
        replies: Vec<(MarkerDictionary, Result<Vec<DetectedMarker>, CollaboratorError>)>,
        queried: Mutex<Vec<MarkerDictionary>>,
    }

    impl FiducialDetector for ScriptedDetector {
        fn detect_markers(
            &self,
            _frame: &FrameView<'_>,
            dictionary: MarkerDictionary,
        ) -> Result<Vec<DetectedMarker>, CollaboratorError> {
            self.queried.lock().expect("lock").push(dictionary);
            self.replies
                .iter()
                .find(|(d, _)| *d == dictionary)
                .map(|(_, r)| r.clone())
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn square_marker(id: u32, x: f32, y: f32, side: f32) -> DetectedMarker {
        DetectedMarker {
            id,
            corners: [
                Point2::new(x, y),
                Point2::new(x + side, y),
                Point2::new(x + side, y + side),
                Point2::new(x, y + side),
            ],
        }
    }

    fn frame() -> (Vec<u8>, usize, usize) {
        (vec![0u8; 8 * 8], 8, 8)
    }

    #[test]
    fn coin_scale_is_diameter_over_known_size() {
        let calibrator = ScaleCalibrator::new(CalibrationParams::coin()).expect("params");
        let mask = Mask::with_rect(200, 200, 40, 60, 54, 54);
        let cal = calibrator.calibrate_coin(Some(&mask));
        assert!(cal.scale.calibrated);
        assert_eq!(cal.scale.method, ReferenceMethod::Coin);
        assert_relative_eq!(cal.scale.pixels_per_unit, 54.0 / 2.7, epsilon = 1e-12);
        assert!(cal.coin.is_some());
    }

    #[test]
    fn coin_uses_longer_side() {
        let params = CalibrationParams {
            coin_diameter_units: 2.0,
            ..CalibrationParams::coin()
        };
        let calibrator = ScaleCalibrator::new(params).expect("params");
        let mask = Mask::with_rect(100, 100, 10, 10, 30, 24);
        let cal = calibrator.calibrate_coin(Some(&mask));
        assert_relative_eq!(cal.scale.pixels_per_unit, 15.0, epsilon = 1e-12);
    }

    #[test]
    fn missing_coin_falls_back() {
        let calibrator = ScaleCalibrator::new(CalibrationParams::coin()).expect("params");
        for cal in [
            calibrator.calibrate_coin(None),
            calibrator.calibrate_coin(Some(&Mask::new(10, 10))),
        ] {
            assert!(!cal.scale.calibrated);
            assert_eq!(cal.scale.pixels_per_unit, DEFAULT_FALLBACK_PX_PER_CM);
            assert!(cal.coin.is_none());
        }
    }

    #[test]
    fn first_dictionary_with_markers_wins() {
        let detector = ScriptedDetector {
            replies: vec![
                (
                    MarkerDictionary::Aruco5x5_50,
                    Ok(vec![square_marker(3, 10.0, 10.0, 90.0)]),
                ),
                (
                    MarkerDictionary::Aruco6x6_50,
                    Ok(vec![square_marker(7, 0.0, 0.0, 45.0)]),
                ),
            ],
            queried: Mutex::new(Vec::new()),
        };
        let calibrator = ScaleCalibrator::new(CalibrationParams::default()).expect("params");
        let (buf, w, h) = frame();
        let view = FrameView::new(w, h, 1, &buf).expect("frame");

        let cal = calibrator.calibrate_marker(&view, &detector);
        assert!(cal.scale.calibrated);
        assert_eq!(cal.dictionary, Some(MarkerDictionary::Aruco5x5_50));
        assert_relative_eq!(cal.scale.pixels_per_unit, 90.0 / 4.5, epsilon = 1e-9);
        assert_eq!(cal.markers.len(), 1);
        assert_eq!(
            *detector.queried.lock().expect("lock"),
            vec![MarkerDictionary::Aruco4x4_50, MarkerDictionary::Aruco5x5_50]
        );
    }

    #[test]
    fn degenerate_first_marker_stops_the_search() {
        let collapsed = DetectedMarker {
            id: 1,
            corners: [
                Point2::new(20.0, 20.0),
                Point2::new(20.0, 20.0),
                Point2::new(60.0, 60.0),
                Point2::new(20.0, 60.0),
            ],
        };
        let detector = ScriptedDetector {
            replies: vec![
                (MarkerDictionary::Aruco4x4_50, Ok(vec![collapsed])),
                (
                    MarkerDictionary::Aruco5x5_50,
                    Ok(vec![square_marker(2, 0.0, 0.0, 45.0)]),
                ),
            ],
            queried: Mutex::new(Vec::new()),
        };
        let calibrator = ScaleCalibrator::new(CalibrationParams::default()).expect("params");
        let (buf, w, h) = frame();
        let view = FrameView::new(w, h, 1, &buf).expect("frame");

        let cal = calibrator.calibrate_marker(&view, &detector);
        assert!(!cal.scale.calibrated);
        assert_eq!(cal.scale.pixels_per_unit, DEFAULT_FALLBACK_PX_PER_CM);
        assert!(cal.dictionary.is_none());
        assert!(cal.markers.is_empty());
        assert_eq!(
            *detector.queried.lock().expect("lock"),
            vec![MarkerDictionary::Aruco4x4_50]
        );
    }

    #[test]
    fn failing_dictionary_is_skipped() {
        let detector = ScriptedDetector {
            replies: vec![
                (
                    MarkerDictionary::Aruco4x4_50,
                    Err(CollaboratorError::new("aruco", "boom")),
                ),
                (
                    MarkerDictionary::AprilTag36h11,
                    Ok(vec![square_marker(1, 5.0, 5.0, 45.0)]),
                ),
            ],
            queried: Mutex::new(Vec::new()),
        };
        let calibrator = ScaleCalibrator::new(CalibrationParams::default()).expect("params");
        let (buf, w, h) = frame();
        let view = FrameView::new(w, h, 1, &buf).expect("frame");

        let cal = calibrator.calibrate_marker(&view, &detector);
        assert_eq!(cal.dictionary, Some(MarkerDictionary::AprilTag36h11));
        assert_relative_eq!(cal.scale.pixels_per_unit, 10.0, epsilon = 1e-9);
    }

    #[test]
    fn no_marker_anywhere_falls_back() {
        let detector = ScriptedDetector {
            replies: Vec::new(),
            queried: Mutex::new(Vec::new()),
        };
        let calibrator = ScaleCalibrator::new(CalibrationParams::default()).expect("params");
        let (buf, w, h) = frame();
        let view = FrameView::new(w, h, 1, &buf).expect("frame");

        let cal = calibrator.calibrate_marker(&view, &detector);
        assert!(!cal.scale.calibrated);
        assert_eq!(cal.scale.method, ReferenceMethod::ArucoMarker);
        assert_eq!(cal.scale.pixels_per_unit, DEFAULT_FALLBACK_PX_PER_CM);
        assert_eq!(detector.queried.lock().expect("lock").len(), 4);
    }

    #[test]
    fn invalid_sizes_are_rejected() {
        let params = CalibrationParams {
            marker_size_units: 0.0,
            ..CalibrationParams::default()
        };
        assert!(matches!(
            ScaleCalibrator::new(params),
            Err(CalibrationError::InvalidReferenceSize {
                what: "marker size",
                ..
            })
        ));
        let params = CalibrationParams {
            dictionaries: Vec::new(),
            ..CalibrationParams::default()
        };
        assert_eq!(
            ScaleCalibrator::new(params).unwrap_err(),
            CalibrationError::NoDictionaries
        );
    }
}

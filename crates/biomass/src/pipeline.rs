//! One analysis run: calibrate, measure, match, estimate, compose.

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use biomass_calib::{Calibration, ReferenceMethod, ScaleCalibrator, ScaleReference};
use biomass_core::{FrameError, FrameView, MaskGeometry, PolygonGeometry};
use biomass_estimate::{
    AggregateResult, BiomassEstimator, DetectionBox, ObjectEstimate, ShapeMeasurer,
    SpeciesCatalog, SpeciesMatcher,
};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    AnalysisConfig, AnalysisMode, ColorContext, Collaborators, ConfigError, IoError,
    ObjectOverlay, ReferenceOverlay, ResultComposer, ResultEntry, SegmentedObject,
    NO_OBJECTS_MESSAGE,
};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Separator between entry descriptions in persisted details.
pub const DETAILS_SEPARATOR: &str = ";;;";
/// Separator between overlay image paths in persisted records.
pub const IMAGE_PATH_SEPARATOR: &str = "|";

pub const TITLE_ACCURATE: &str = "Volume (Accurate)";
pub const TITLE_ESTIMATED: &str = "Volume (Estimated)";

/// Only invalid calls fail a run; everything else degrades.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error(transparent)]
    InvalidFrame(#[from] FrameError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Output of one run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub scale: ScaleReference,
    pub calibration: Calibration,
    pub aggregate: AggregateResult,
    /// Every segmented object, including ones whose measurement failed.
    pub objects: Vec<ObjectEstimate>,
    pub entries: Vec<ResultEntry>,
}

impl AnalysisReport {
    /// Entry descriptions joined for storage.
    pub fn persisted_details(&self) -> String {
        self.entries
            .iter()
            .map(|e| e.description.as_str())
            .collect::<Vec<_>>()
            .join(DETAILS_SEPARATOR)
    }

    /// Heading that tells measurements from fallback-scale estimates.
    pub fn title(&self) -> &'static str {
        if self.scale.calibrated {
            TITLE_ACCURATE
        } else {
            TITLE_ESTIMATED
        }
    }

    /// Text for presentation; a fixed message when nothing was found.
    pub fn display_text(&self) -> String {
        if self.entries.is_empty() {
            NO_OBJECTS_MESSAGE.to_string()
        } else {
            self.entries
                .iter()
                .map(|e| e.description.as_str())
                .collect::<Vec<_>>()
                .join("\n\n")
        }
    }

    /// Load a report from JSON on disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this report to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), IoError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Join overlay image paths for storage.
pub fn join_image_paths<I, P>(paths: I) -> String
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    paths
        .into_iter()
        .map(|p| p.as_ref().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(IMAGE_PATH_SEPARATOR)
}

/// Long-lived analysis context.
///
/// Collaborators are shared read-only; `run` holds a session-wide lock for
/// its whole duration, so concurrent callers queue.
pub struct AnalysisSession<G = PolygonGeometry> {
    config: AnalysisConfig,
    collaborators: Collaborators,
    calibrator: ScaleCalibrator<G>,
    estimator: BiomassEstimator<G>,
    composer: ResultComposer,
    run_lock: Mutex<()>,
}

impl AnalysisSession<PolygonGeometry> {
    pub fn new(config: AnalysisConfig, collaborators: Collaborators) -> Result<Self, PipelineError> {
        Self::with_geometry(config, collaborators, PolygonGeometry, SpeciesCatalog::builtin())
    }
}

impl<G: MaskGeometry + Clone> AnalysisSession<G> {
    pub fn with_geometry(
        config: AnalysisConfig,
        collaborators: Collaborators,
        geometry: G,
        catalog: SpeciesCatalog,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let calibrator = ScaleCalibrator::with_geometry(config.calibration_params(), geometry.clone())
            .map_err(ConfigError::from)?;
        let measurer =
            ShapeMeasurer::new(geometry).with_default_ratio(config.cross_section_ratio_default);
        let estimator =
            BiomassEstimator::new(measurer, SpeciesMatcher::new(config.iou_threshold), catalog);
        let composer = ResultComposer::new(config.output_mode);
        Ok(Self {
            config,
            collaborators,
            calibrator,
            estimator,
            composer,
            run_lock: Mutex::new(()),
        })
    }

    #[inline]
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    #[inline]
    pub fn estimator(&self) -> &BiomassEstimator<G> {
        &self.estimator
    }

    /// Analyse one decoded frame.
    ///
    /// Collaborator failures are logged and count as empty output; only an
    /// invalid frame is an error.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip_all, fields(width = frame.width, height = frame.height))
    )]
    pub fn run(&self, frame: &FrameView<'_>) -> Result<AnalysisReport, PipelineError> {
        let _guard = self.run_lock.lock().unwrap_or_else(PoisonError::into_inner);
        frame.validate()?;

        let coin = match self.config.reference_method {
            ReferenceMethod::Coin => segment("reference", self.collaborators.reference.as_deref(), frame)
                .into_iter()
                .next(),
            ReferenceMethod::ArucoMarker => None,
        };
        let calibration = self.calibrator.calibrate(
            frame,
            coin.as_ref().map(|c| &*c.mask),
            self.collaborators.markers.as_deref(),
        );
        let scale = calibration.scale;
        let ppu = scale.pixels_per_unit;

        let (segmented, detections) = match self.config.analysis_mode {
            AnalysisMode::Individual => (
                segment("objects", self.collaborators.objects.as_deref(), frame),
                detect(self.collaborators.detector.as_deref(), frame),
            ),
            AnalysisMode::Pile => (
                segment("bulk", self.collaborators.bulk.as_deref(), frame),
                Vec::new(),
            ),
        };

        let objects: Vec<ObjectEstimate> = segmented
            .iter()
            .map(|s| self.estimate(s, &detections, ppu))
            .collect();

        let reference = coin.as_ref().map(|c| ReferenceOverlay {
            bounds: c.bounds,
            mask: Some(c.mask.clone()),
            pixels_per_unit: ppu,
        });
        let overlays: Vec<ObjectOverlay<'_>> = objects
            .iter()
            .zip(&segmented)
            .map(|(estimate, s)| ObjectOverlay {
                estimate,
                mask: Some(s.mask.clone()),
            })
            .collect();
        let mut colors = ColorContext::new();
        let entries = self.composer.compose(
            frame.width,
            frame.height,
            reference.as_ref(),
            &overlays,
            &mut colors,
        );

        let aggregate = AggregateResult::from_objects(objects.iter().cloned(), scale.calibrated);
        info!(
            "{} object(s), {} measured, {:.1} g total ({})",
            objects.len(),
            aggregate.objects.len(),
            aggregate.total_weight,
            if scale.calibrated { "calibrated" } else { "fallback scale" }
        );

        Ok(AnalysisReport {
            scale,
            calibration,
            aggregate,
            objects,
            entries,
        })
    }

    fn estimate(&self, object: &SegmentedObject, detections: &[DetectionBox], ppu: f64) -> ObjectEstimate {
        let pile = self.config.analysis_mode == AnalysisMode::Pile
            || object.class_name.eq_ignore_ascii_case(biomass_estimate::PILE_LABEL);
        if pile {
            self.estimator
                .estimate_pile(&object.mask, Some(&object.bounds), ppu)
        } else {
            self.estimator.estimate_individual(
                &object.mask,
                &object.class_name,
                Some(&object.bounds),
                detections,
                ppu,
            )
        }
    }
}

fn segment(
    name: &str,
    segmenter: Option<&dyn crate::Segmenter>,
    frame: &FrameView<'_>,
) -> Vec<SegmentedObject> {
    let Some(segmenter) = segmenter else {
        return Vec::new();
    };
    match segmenter.segment(frame) {
        Ok(objects) => objects
            .into_iter()
            .filter(|o| {
                let fits = o.mask.width == frame.width && o.mask.height == frame.height;
                if !fits {
                    warn!(
                        "{name} mask is {}x{} but the frame is {}x{}, skipping it",
                        o.mask.width, o.mask.height, frame.width, frame.height
                    );
                }
                fits
            })
            .collect(),
        Err(err) => {
            warn!("{name} segmentation failed, continuing without it: {err}");
            Vec::new()
        }
    }
}

fn detect(detector: Option<&dyn crate::Detector>, frame: &FrameView<'_>) -> Vec<DetectionBox> {
    let Some(detector) = detector else {
        return Vec::new();
    };
    detector.detect(frame).unwrap_or_else(|err| {
        warn!("species detection failed, keeping segmenter labels: {err}");
        Vec::new()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::OutputMode;

    fn entry(description: &str) -> ResultEntry {
        ResultEntry {
            description: description.to_string(),
            scene: Default::default(),
        }
    }

    fn report(calibrated: bool, entries: Vec<ResultEntry>) -> AnalysisReport {
        let scale = ScaleReference {
            pixels_per_unit: 10.0,
            method: ReferenceMethod::Coin,
            calibrated,
        };
        AnalysisReport {
            scale,
            calibration: Calibration {
                scale,
                coin: None,
                dictionary: None,
                markers: Vec::new(),
            },
            aggregate: AggregateResult::default(),
            objects: Vec::new(),
            entries,
        }
    }

    #[test]
    fn details_and_paths_use_fixed_separators() {
        let r = report(true, vec![entry("a"), entry("b\nc")]);
        assert_eq!(r.persisted_details(), "a;;;b\nc");
        assert_eq!(join_image_paths(["/x/1.png", "/x/2.png"]), "/x/1.png|/x/2.png");
        assert_eq!(join_image_paths(Vec::<String>::new()), "");
    }

    #[test]
    fn title_reflects_calibration() {
        assert_eq!(report(true, Vec::new()).title(), "Volume (Accurate)");
        assert_eq!(report(false, Vec::new()).title(), "Volume (Estimated)");
    }

    #[test]
    fn empty_report_displays_message() {
        assert_eq!(report(true, Vec::new()).display_text(), "No objects detected");
        assert_eq!(report(true, vec![entry("x")]).display_text(), "x");
    }

    #[test]
    fn invalid_config_is_rejected() {
        let cfg = AnalysisConfig {
            cross_section_ratio_default: 2.0,
            output_mode: OutputMode::Combined,
            ..AnalysisConfig::default()
        };
        assert!(matches!(
            AnalysisSession::new(cfg, Collaborators::default()),
            Err(PipelineError::Config(ConfigError::InvalidRatio(_)))
        ));
    }
}

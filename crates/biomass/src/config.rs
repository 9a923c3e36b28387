//! JSON configuration for an analysis session.

use biomass_calib::{
    CalibrationError, CalibrationParams, MarkerDictionary, ReferenceMethod,
    DEFAULT_COIN_DIAMETER_CM, DEFAULT_FALLBACK_PX_PER_CM, DEFAULT_MARKER_SIZE_CM,
    DEFAULT_SEARCH_ORDER,
};
use biomass_estimate::{DEFAULT_CROSS_SECTION_RATIO, DEFAULT_IOU_THRESHOLD};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

#[derive(thiserror::Error, Debug)]
pub enum IoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
    #[error("default cross-section ratio must be in (0, 1] (got {0})")]
    InvalidRatio(f64),
    #[error("IoU threshold must be in [0, 1) (got {0})")]
    InvalidIouThreshold(f32),
}

/// One result per object, or one combined canvas.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    #[default]
    Separate,
    Combined,
}

/// Which segmenter provides the measured objects.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    /// Per-object segmentation, allometric weights.
    #[default]
    Individual,
    /// Bulk segmentation, cone volumes.
    Pile,
}

fn default_ratio() -> f64 {
    DEFAULT_CROSS_SECTION_RATIO
}

fn default_reference_method() -> ReferenceMethod {
    ReferenceMethod::ArucoMarker
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

fn default_iou_threshold() -> f32 {
    DEFAULT_IOU_THRESHOLD
}

fn default_dictionaries() -> Vec<MarkerDictionary> {
    DEFAULT_SEARCH_ORDER.to_vec()
}

/// Session configuration. Every field has a default, so `{}` is valid JSON.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_ratio")]
    pub cross_section_ratio_default: f64,
    #[serde(default = "default_reference_method")]
    pub reference_method: ReferenceMethod,
    #[serde(default = "default_coin_diameter")]
    pub coin_diameter_units: f64,
    #[serde(default = "default_marker_size")]
    pub marker_size_units: f64,
    #[serde(default = "default_fallback")]
    pub fallback_pixels_per_unit: f64,
    #[serde(default)]
    pub output_mode: OutputMode,
    #[serde(default)]
    pub analysis_mode: AnalysisMode,
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f32,
    #[serde(default = "default_dictionaries")]
    pub marker_dictionaries: Vec<MarkerDictionary>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            cross_section_ratio_default: DEFAULT_CROSS_SECTION_RATIO,
            reference_method: default_reference_method(),
            coin_diameter_units: DEFAULT_COIN_DIAMETER_CM,
            marker_size_units: DEFAULT_MARKER_SIZE_CM,
            fallback_pixels_per_unit: DEFAULT_FALLBACK_PX_PER_CM,
            output_mode: OutputMode::default(),
            analysis_mode: AnalysisMode::default(),
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            marker_dictionaries: default_dictionaries(),
        }
    }
}

impl AnalysisConfig {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), IoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn calibration_params(&self) -> CalibrationParams {
        CalibrationParams {
            method: self.reference_method,
            coin_diameter_units: self.coin_diameter_units,
            marker_size_units: self.marker_size_units,
            fallback_pixels_per_unit: self.fallback_pixels_per_unit,
            dictionaries: self.marker_dictionaries.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let r = self.cross_section_ratio_default;
        if !(r > 0.0 && r <= 1.0) {
            return Err(ConfigError::InvalidRatio(r));
        }
        if !(self.iou_threshold >= 0.0 && self.iou_threshold < 1.0) {
            return Err(ConfigError::InvalidIouThreshold(self.iou_threshold));
        }
        self.calibration_params().validate()?;
        Ok(())
    }
}

//! File-based analysis jobs: an image, precomputed model outputs and a
//! config, all described by one JSON document.
//!
//! ```json
//! {
//!   "image_path": "frame.png",
//!   "config": { "reference_method": "coin" },
//!   "reference": [{ "mask_path": "coin.png" }],
//!   "objects": [{ "mask_path": "fish0.png", "class_name": "rohu", "confidence": 0.9 }],
//!   "detections": [{ "rect": { "x1": 0.1, "y1": 0.2, "x2": 0.5, "y2": 0.4 }, "class_name": "catla", "confidence": 0.8 }]
//! }
//! ```
//!
//! Relative paths are resolved against the directory holding the job file.

use std::fs;
use std::path::{Path, PathBuf};

use biomass_calib::{DetectedMarker, MarkerDictionary};
use biomass_estimate::{CatalogError, DetectionBox, SpeciesCatalog};
use image::RgbImage;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::render::{frame_view, mask_from_gray, render_overlay, ImageprocGeometry};
use crate::{
    AnalysisConfig, AnalysisReport, AnalysisSession, Collaborators, IoError, PipelineError,
    PrecomputedDetector, PrecomputedMarkers, PrecomputedSegmenter, SegmentedObject,
};

#[derive(thiserror::Error, Debug)]
pub enum JobError {
    #[error(transparent)]
    Io(#[from] IoError),
    #[error("failed to read or write image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("mask {path} is {got:?}, frame is {expected:?}")]
    MaskSize {
        path: PathBuf,
        expected: (u32, u32),
        got: (u32, u32),
    },
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

fn default_confidence() -> f32 {
    1.0
}

/// A mask PNG (any non-zero pixel is occupied) with its model label.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MaskEntry {
    pub mask_path: PathBuf,
    #[serde(default)]
    pub class_name: String,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
}

/// Markers already decoded for one dictionary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkerEntry {
    pub dictionary: MarkerDictionary,
    pub markers: Vec<DetectedMarker>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalysisJob {
    pub image_path: PathBuf,
    #[serde(default)]
    pub config: AnalysisConfig,
    #[serde(default)]
    pub reference: Vec<MaskEntry>,
    #[serde(default)]
    pub objects: Vec<MaskEntry>,
    #[serde(default)]
    pub bulk: Vec<MaskEntry>,
    #[serde(default)]
    pub detections: Vec<DetectionBox>,
    #[serde(default)]
    pub markers: Option<MarkerEntry>,
    #[serde(default)]
    pub species_catalog_path: Option<PathBuf>,
    #[serde(default)]
    pub output_path: Option<PathBuf>,
    #[serde(default)]
    pub overlay_dir: Option<PathBuf>,
}

/// Result of [`AnalysisJob::execute`].
#[derive(Debug)]
pub struct JobOutput {
    pub report: AnalysisReport,
    /// Overlay PNGs written, one per entry, in entry order.
    pub overlay_paths: Vec<PathBuf>,
}

impl AnalysisJob {
    /// Load a job and resolve its relative paths against the job file's directory.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, JobError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(IoError::from)?;
        let mut job: Self = serde_json::from_str(&raw).map_err(IoError::from)?;
        if let Some(dir) = path.parent() {
            job.rebase(dir);
        }
        Ok(job)
    }

    fn rebase(&mut self, dir: &Path) {
        let fix = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = dir.join(&*p);
            }
        };
        fix(&mut self.image_path);
        for entry in self
            .reference
            .iter_mut()
            .chain(self.objects.iter_mut())
            .chain(self.bulk.iter_mut())
        {
            fix(&mut entry.mask_path);
        }
        for p in [
            &mut self.species_catalog_path,
            &mut self.output_path,
            &mut self.overlay_dir,
        ]
        .into_iter()
        .flatten()
        {
            fix(p);
        }
    }

    pub fn load_image(&self) -> Result<RgbImage, JobError> {
        let img = image::open(&self.image_path).map_err(|source| JobError::Image {
            path: self.image_path.clone(),
            source,
        })?;
        Ok(img.to_rgb8())
    }

    /// Custom catalog when a path is given, the built-in table otherwise.
    pub fn catalog(&self) -> Result<SpeciesCatalog, JobError> {
        match &self.species_catalog_path {
            Some(path) => {
                let raw = fs::read_to_string(path).map_err(IoError::from)?;
                Ok(SpeciesCatalog::from_json(&raw)?)
            }
            None => Ok(SpeciesCatalog::builtin()),
        }
    }

    /// Replay the job's precomputed model outputs for a `width × height` frame.
    pub fn collaborators(&self, width: u32, height: u32) -> Result<Collaborators, JobError> {
        let load = |entries: &[MaskEntry]| -> Result<Option<PrecomputedSegmenter>, JobError> {
            if entries.is_empty() {
                return Ok(None);
            }
            let objects = entries
                .iter()
                .map(|e| load_mask(e, width, height))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Some(PrecomputedSegmenter::new(objects)))
        };

        let mut collaborators = Collaborators::default();
        if let Some(s) = load(&self.reference)? {
            collaborators = collaborators.with_reference(s);
        }
        if let Some(s) = load(&self.objects)? {
            collaborators = collaborators.with_objects(s);
        }
        if let Some(s) = load(&self.bulk)? {
            collaborators = collaborators.with_bulk(s);
        }
        if !self.detections.is_empty() {
            collaborators =
                collaborators.with_detector(PrecomputedDetector::new(self.detections.clone()));
        }
        if let Some(m) = &self.markers {
            collaborators =
                collaborators.with_markers(PrecomputedMarkers::new(m.dictionary, m.markers.clone()));
        }
        Ok(collaborators)
    }

    /// Run the job, writing the report and overlays where configured.
    pub fn execute(&self) -> Result<JobOutput, JobError> {
        let image = self.load_image()?;
        let collaborators = self.collaborators(image.width(), image.height())?;
        let session = AnalysisSession::with_geometry(
            self.config.clone(),
            collaborators,
            ImageprocGeometry,
            self.catalog()?,
        )?;
        let report = session.run(&frame_view(&image))?;

        if let Some(path) = &self.output_path {
            report.write_json(path)?;
            info!("report written to {}", path.display());
        }
        let overlay_paths = match &self.overlay_dir {
            Some(dir) => write_overlays(&image, &report, dir)?,
            None => Vec::new(),
        };
        Ok(JobOutput {
            report,
            overlay_paths,
        })
    }
}

fn load_mask(entry: &MaskEntry, width: u32, height: u32) -> Result<SegmentedObject, JobError> {
    let gray = image::open(&entry.mask_path)
        .map_err(|source| JobError::Image {
            path: entry.mask_path.clone(),
            source,
        })?
        .to_luma8();
    if gray.dimensions() != (width, height) {
        return Err(JobError::MaskSize {
            path: entry.mask_path.clone(),
            expected: (width, height),
            got: gray.dimensions(),
        });
    }
    debug!("loaded mask {}", entry.mask_path.display());
    Ok(SegmentedObject::from_mask(
        mask_from_gray(&gray),
        entry.class_name.clone(),
        entry.confidence,
    ))
}

/// Render one `overlay_<n>.png` per report entry into `dir`.
pub fn write_overlays(
    image: &RgbImage,
    report: &AnalysisReport,
    dir: &Path,
) -> Result<Vec<PathBuf>, JobError> {
    fs::create_dir_all(dir).map_err(IoError::from)?;
    report
        .entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let path = dir.join(format!("overlay_{i}.png"));
            render_overlay(image, &entry.scene)
                .save(&path)
                .map_err(|source| JobError::Image {
                    path: path.clone(),
                    source,
                })?;
            Ok(path)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_job_uses_defaults() {
        let job: AnalysisJob = serde_json::from_str(r#"{"image_path": "a.png"}"#).expect("job");
        assert_eq!(job.config, AnalysisConfig::default());
        assert!(job.objects.is_empty() && job.markers.is_none());
    }

    #[test]
    fn relative_paths_follow_job_file() {
        let mut job: AnalysisJob = serde_json::from_str(
            r#"{"image_path": "a.png", "objects": [{"mask_path": "m.png"}],
                "overlay_dir": "/abs/out"}"#,
        )
        .expect("job");
        job.rebase(Path::new("/jobs"));
        assert_eq!(job.image_path, PathBuf::from("/jobs/a.png"));
        assert_eq!(job.objects[0].mask_path, PathBuf::from("/jobs/m.png"));
        assert_eq!(job.objects[0].confidence, 1.0);
        assert_eq!(job.overlay_dir, Some(PathBuf::from("/abs/out")));
    }
}

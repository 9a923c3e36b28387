//! High-level facade for the `biomass-*` workspace.
//!
//! This crate provides:
//! - re-exports of the calibration, core and estimation crates
//! - [`AnalysisSession`], which runs one frame through calibration,
//!   measurement, species matching, estimation and result composition
//! - (feature `image`) mask/image conversion, an `imageproc`-backed
//!   geometry backend and overlay rendering
//!
//! ## Quickstart
//!
//! ```no_run
//! use biomass::{AnalysisConfig, AnalysisSession, Collaborators, PrecomputedSegmenter, SegmentedObject};
//! use biomass::core::{FrameView, Mask};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let pixels = vec![0u8; 200 * 100 * 3];
//! let frame = FrameView::new(200, 100, 3, &pixels)?;
//!
//! let fish = SegmentedObject::from_mask(Mask::with_rect(200, 100, 50, 30, 100, 40), "rohu", 0.9);
//! let collaborators = Collaborators::default().with_objects(PrecomputedSegmenter::new(vec![fish]));
//!
//! let session = AnalysisSession::new(AnalysisConfig::default(), collaborators)?;
//! let report = session.run(&frame)?;
//! println!("{}\n{}", report.title(), report.display_text());
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `biomass::core`: masks, normalized boxes, frames, geometry seam, logger.
//! - `biomass::calib`: coin and fiducial-marker scale calibration.
//! - `biomass::estimate`: measurement, species catalog and matching, weights.
//! - `biomass::render` (feature `image`): `image`/`imageproc` integration.

pub use biomass_calib as calib;
pub use biomass_core as core;
pub use biomass_estimate as estimate;

mod collaborators;
mod compose;
mod config;
mod pipeline;

#[cfg(feature = "image")]
pub mod job;
#[cfg(feature = "image")]
pub mod render;

pub use collaborators::{
    Collaborators, Detector, PrecomputedDetector, PrecomputedMarkers, PrecomputedSegmenter,
    SegmentedObject, Segmenter,
};
pub use compose::{
    describe, ColorContext, ObjectOverlay, Outline, OverlayScene, OverlayShape,
    ReferenceOverlay, ResultComposer, ResultEntry, Rgb, NO_OBJECTS_MESSAGE, OBJECT_STROKE,
    PALETTE, REFERENCE_STROKE, REFERENCE_TINT,
};
pub use config::{AnalysisConfig, AnalysisMode, ConfigError, IoError, OutputMode};
pub use pipeline::{
    join_image_paths, AnalysisReport, AnalysisSession, PipelineError, DETAILS_SEPARATOR,
    IMAGE_PATH_SEPARATOR, TITLE_ACCURATE, TITLE_ESTIMATED,
};

pub use biomass_calib::{Calibration, ReferenceMethod, ScaleReference};
pub use biomass_estimate::{AggregateResult, ObjectEstimate, SpeciesCatalog, SpeciesTotals};

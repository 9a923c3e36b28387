//! Seams for the external segmentation and detection models.
//!
//! Model handles are loaded once by the caller and shared read-only between
//! runs, hence `Send + Sync` and `&self` everywhere. The `Precomputed*`
//! implementations replay fixed outputs (CLI jobs, tests).

use std::sync::Arc;

use biomass_calib::{DetectedMarker, FiducialDetector, MarkerDictionary};
use biomass_core::{CollaboratorError, FrameView, Mask, NormRect};
use biomass_estimate::DetectionBox;

/// One instance segmented by a model.
#[derive(Clone, Debug, PartialEq)]
pub struct SegmentedObject {
    pub mask: Arc<Mask>,
    /// Model-reported box, normalized to the frame.
    pub bounds: NormRect,
    pub class_name: String,
    pub confidence: f32,
}

impl SegmentedObject {
    /// Wrap a mask, deriving the box from its occupied pixels.
    pub fn from_mask(mask: Mask, class_name: impl Into<String>, confidence: f32) -> Self {
        let bounds = mask
            .bounds()
            .map(|b| NormRect::from_pixel_bounds(&b, mask.width, mask.height))
            .unwrap_or(NormRect::new(0.0, 0.0, 0.0, 0.0));
        Self {
            mask: Arc::new(mask),
            bounds,
            class_name: class_name.into(),
            confidence,
        }
    }
}

/// Instance segmentation model (reference object, bulk or per-object).
///
/// Masks must have the frame's dimensions; the session skips any that do
/// not.
pub trait Segmenter: Send + Sync {
    fn segment(&self, frame: &FrameView<'_>) -> Result<Vec<SegmentedObject>, CollaboratorError>;
}

/// Box detector used only for species labels.
pub trait Detector: Send + Sync {
    fn detect(&self, frame: &FrameView<'_>) -> Result<Vec<DetectionBox>, CollaboratorError>;
}

#[derive(Clone, Debug, Default)]
pub struct PrecomputedSegmenter {
    objects: Vec<SegmentedObject>,
}

impl PrecomputedSegmenter {
    pub fn new(objects: Vec<SegmentedObject>) -> Self {
        Self { objects }
    }
}

impl Segmenter for PrecomputedSegmenter {
    fn segment(&self, _frame: &FrameView<'_>) -> Result<Vec<SegmentedObject>, CollaboratorError> {
        Ok(self.objects.clone())
    }
}

#[derive(Clone, Debug, Default)]
pub struct PrecomputedDetector {
    boxes: Vec<DetectionBox>,
}

impl PrecomputedDetector {
    pub fn new(boxes: Vec<DetectionBox>) -> Self {
        Self { boxes }
    }
}

impl Detector for PrecomputedDetector {
    fn detect(&self, _frame: &FrameView<'_>) -> Result<Vec<DetectionBox>, CollaboratorError> {
        Ok(self.boxes.clone())
    }
}

/// Markers known to belong to a single dictionary.
#[derive(Clone, Debug)]
pub struct PrecomputedMarkers {
    dictionary: MarkerDictionary,
    markers: Vec<DetectedMarker>,
}

impl PrecomputedMarkers {
    pub fn new(dictionary: MarkerDictionary, markers: Vec<DetectedMarker>) -> Self {
        Self {
            dictionary,
            markers,
        }
    }
}

impl FiducialDetector for PrecomputedMarkers {
    fn detect_markers(
        &self,
        _frame: &FrameView<'_>,
        dictionary: MarkerDictionary,
    ) -> Result<Vec<DetectedMarker>, CollaboratorError> {
        if dictionary == self.dictionary {
            Ok(self.markers.clone())
        } else {
            Ok(Vec::new())
        }
    }
}

/// Model handles shared by every run of a session. Missing ones contribute
/// nothing.
#[derive(Clone, Default)]
pub struct Collaborators {
    pub reference: Option<Arc<dyn Segmenter>>,
    pub bulk: Option<Arc<dyn Segmenter>>,
    pub objects: Option<Arc<dyn Segmenter>>,
    pub detector: Option<Arc<dyn Detector>>,
    pub markers: Option<Arc<dyn FiducialDetector>>,
}

impl Collaborators {
    pub fn with_reference(mut self, s: impl Segmenter + 'static) -> Self {
        self.reference = Some(Arc::new(s));
        self
    }

    pub fn with_bulk(mut self, s: impl Segmenter + 'static) -> Self {
        self.bulk = Some(Arc::new(s));
        self
    }

    pub fn with_objects(mut self, s: impl Segmenter + 'static) -> Self {
        self.objects = Some(Arc::new(s));
        self
    }

    pub fn with_detector(mut self, d: impl Detector + 'static) -> Self {
        self.detector = Some(Arc::new(d));
        self
    }

    pub fn with_markers(mut self, m: impl FiducialDetector + 'static) -> Self {
        self.markers = Some(Arc::new(m));
        self
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("reference", &self.reference.is_some())
            .field("bulk", &self.bulk.is_some())
            .field("objects", &self.objects.is_some())
            .field("detector", &self.detector.is_some())
            .field("markers", &self.markers.is_some())
            .finish()
    }
}

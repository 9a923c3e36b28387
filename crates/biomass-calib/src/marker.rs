use biomass_core::{CollaboratorError, FrameView};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::MarkerDictionary;

/// One fiducial marker found in the frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectedMarker {
    pub id: u32,
    /// Corners in image coordinates (TL, TR, BR, BL).
    pub corners: [Point2<f32>; 4],
}

impl DetectedMarker {
    /// Length of the first edge (corner 0 to corner 1) in pixels.
    pub fn side_px(&self) -> f64 {
        let d = self.corners[1] - self.corners[0];
        (d.x as f64).hypot(d.y as f64)
    }
}

/// External marker detector.
///
/// Quad finding and bit decoding live outside this workspace; implementors
/// wrap whatever detector is available and report markers of a single
/// dictionary per call.
pub trait FiducialDetector: Send + Sync {
    fn detect_markers(
        &self,
        frame: &FrameView<'_>,
        dictionary: MarkerDictionary,
    ) -> Result<Vec<DetectedMarker>, CollaboratorError>;
}

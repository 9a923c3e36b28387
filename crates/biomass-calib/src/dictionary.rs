//! Fiducial dictionaries searched during marker calibration.

use serde::{Deserialize, Serialize};

/// A predefined ArUco/AprilTag-style dictionary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarkerDictionary {
    #[serde(rename = "DICT_4X4_50")]
    Aruco4x4_50,
    #[serde(rename = "DICT_5X5_50")]
    Aruco5x5_50,
    #[serde(rename = "DICT_6X6_50")]
    Aruco6x6_50,
    #[serde(rename = "DICT_APRILTAG_36h11")]
    AprilTag36h11,
}

/// Dictionaries tried in order; the first one yielding a marker wins.
pub const DEFAULT_SEARCH_ORDER: [MarkerDictionary; 4] = [
    MarkerDictionary::Aruco4x4_50,
    MarkerDictionary::Aruco5x5_50,
    MarkerDictionary::Aruco6x6_50,
    MarkerDictionary::AprilTag36h11,
];

impl MarkerDictionary {
    /// Human-readable name (OpenCV spelling).
    pub fn name(&self) -> &'static str {
        match self {
            Self::Aruco4x4_50 => "DICT_4X4_50",
            Self::Aruco5x5_50 => "DICT_5X5_50",
            Self::Aruco6x6_50 => "DICT_6X6_50",
            Self::AprilTag36h11 => "DICT_APRILTAG_36h11",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_uses_opencv_names() {
        let json = serde_json::to_string(&MarkerDictionary::Aruco5x5_50).expect("serialize");
        assert_eq!(json, "\"DICT_5X5_50\"");
        for d in DEFAULT_SEARCH_ORDER {
            let json = serde_json::to_string(&d).expect("serialize");
            assert_eq!(json, format!("\"{}\"", d.name()));
        }
    }
}

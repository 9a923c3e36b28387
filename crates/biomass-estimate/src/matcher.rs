use biomass_core::NormRect;
use serde::{Deserialize, Serialize};

/// Minimum IoU for a detection to relabel a mask.
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.1;

/// Independent detector output, used only to refine species labels.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionBox {
    pub rect: NormRect,
    pub class_name: String,
    pub confidence: f32,
}

impl DetectionBox {
    pub fn new(rect: NormRect, class_name: impl Into<String>, confidence: f32) -> Self {
        Self {
            rect,
            class_name: class_name.into(),
            confidence,
        }
    }
}

/// Label chosen for one measured object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpeciesAssignment {
    pub label: String,
    /// Index into the detection list and its IoU, when a detection won.
    pub matched: Option<(usize, f32)>,
}

impl SpeciesAssignment {
    /// Keep the segmentation collaborator's own label.
    pub fn unmatched(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            matched: None,
        }
    }

    #[inline]
    pub fn is_matched(&self) -> bool {
        self.matched.is_some()
    }
}

/// Assigns species by maximal overlap with detection boxes.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpeciesMatcher {
    pub iou_threshold: f32,
}

impl Default for SpeciesMatcher {
    fn default() -> Self {
        Self {
            iou_threshold: DEFAULT_IOU_THRESHOLD,
        }
    }
}

impl SpeciesMatcher {
    pub fn new(iou_threshold: f32) -> Self {
        Self { iou_threshold }
    }

    /// Best-overlapping detection's class if its IoU is strictly above the
    /// threshold, otherwise `origin_label`. Equal IoUs keep the earlier box.
    pub fn assign(
        &self,
        bounds: &NormRect,
        origin_label: &str,
        boxes: &[DetectionBox],
    ) -> SpeciesAssignment {
        let mut best: Option<(usize, f32)> = None;
        for (idx, det) in boxes.iter().enumerate() {
            let iou = bounds.iou(&det.rect);
            if best.is_none_or(|(_, b)| iou > b) {
                best = Some((idx, iou));
            }
        }

        match best {
            Some((idx, iou)) if iou > self.iou_threshold => {
                log::debug!(
                    "relabel '{}' -> '{}' (iou {:.3})",
                    origin_label,
                    boxes[idx].class_name,
                    iou
                );
                SpeciesAssignment {
                    label: boxes[idx].class_name.clone(),
                    matched: Some((idx, iou)),
                }
            }
            _ => SpeciesAssignment::unmatched(origin_label),
        }
    }
}

//! Per-object descriptions and overlay scenes.
//!
//! Scenes are plain data (outlines, tints, labels); rasterizing them is the
//! job of [`crate::render`] or any other presentation layer.

use std::fmt::Write as _;
use std::sync::Arc;

use biomass_core::{Mask, NormRect};
use biomass_estimate::{ObjectEstimate, ObjectKind};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::OutputMode;

pub type Rgb = [u8; 3];

/// Round-robin class colors: orange, blue, green, red, pink, cyan, purple, gray.
pub const PALETTE: [Rgb; 8] = [
    [255, 152, 0],
    [33, 150, 243],
    [76, 175, 80],
    [244, 67, 54],
    [233, 30, 99],
    [0, 188, 212],
    [156, 39, 176],
    [158, 158, 158],
];

pub const REFERENCE_TINT: Rgb = [255, 255, 255];
pub const REFERENCE_STROKE: Rgb = [255, 255, 0];
pub const OBJECT_STROKE: Rgb = [255, 255, 255];

/// Shown when a run produced no entries.
pub const NO_OBJECTS_MESSAGE: &str = "No objects detected";

/// Class → palette assignment for one run.
///
/// Classes get consecutive palette slots in the order they are first seen
/// and keep them for the rest of the run. Class names compare ASCII
/// case-insensitively, matching species grouping. Create a fresh context per run.
#[derive(Clone, Debug, Default)]
pub struct ColorContext {
    classes: Vec<String>,
}

impl ColorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn color_for(&mut self, class: &str) -> Rgb {
        let idx = match self.classes.iter().position(|c| c.eq_ignore_ascii_case(class)) {
            Some(idx) => idx,
            None => {
                self.classes.push(class.to_string());
                self.classes.len() - 1
            }
        };
        PALETTE[idx % PALETTE.len()]
    }

    /// Distinct classes seen so far.
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// Outline of one shape: the oriented box when measured, the axis-aligned
/// box otherwise.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outline {
    Oriented { corners: [Point2<f64>; 4] },
    Rect { rect: NormRect },
}

impl Outline {
    fn for_estimate(estimate: &ObjectEstimate) -> Option<Self> {
        match (estimate.measurement.corners, estimate.bounds) {
            (Some(corners), _) => Some(Self::Oriented { corners }),
            (None, Some(rect)) => Some(Self::Rect { rect }),
            (None, None) => None,
        }
    }

    /// Corner points in pixel coordinates of a `width × height` canvas.
    pub fn pixel_corners(&self, width: usize, height: usize) -> [Point2<f64>; 4] {
        match self {
            Self::Oriented { corners } => *corners,
            Self::Rect { rect } => {
                let [l, t, r, b] = rect.to_pixels(width, height).map(f64::from);
                [
                    Point2::new(l, t),
                    Point2::new(r, t),
                    Point2::new(r, b),
                    Point2::new(l, b),
                ]
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OverlayShape {
    pub outline: Option<Outline>,
    pub tint: Rgb,
    pub stroke: Rgb,
    /// Short on-canvas caption.
    pub label: String,
    #[serde(skip)]
    pub mask: Option<Arc<Mask>>,
}

/// Everything drawn on one canvas.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OverlayScene {
    pub width: usize,
    pub height: usize,
    pub shapes: Vec<OverlayShape>,
}

/// One presentable result: description text plus its overlay.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResultEntry {
    pub description: String,
    pub scene: OverlayScene,
}

/// The calibration coin, drawn on every canvas.
#[derive(Clone, Debug)]
pub struct ReferenceOverlay {
    pub bounds: NormRect,
    pub mask: Option<Arc<Mask>>,
    pub pixels_per_unit: f64,
}

impl ReferenceOverlay {
    /// Longer side of the coin box in real units.
    pub fn diameter_units(&self, width: usize, height: usize) -> f64 {
        if !(self.pixels_per_unit > 0.0) {
            return 0.0;
        }
        let w = f64::from(self.bounds.width()) * width as f64;
        let h = f64::from(self.bounds.height()) * height as f64;
        w.max(h) / self.pixels_per_unit
    }

    fn shape(&self, width: usize, height: usize) -> OverlayShape {
        OverlayShape {
            outline: Some(Outline::Rect { rect: self.bounds }),
            tint: REFERENCE_TINT,
            stroke: REFERENCE_STROKE,
            label: format!("Coin: {:.1}cm", self.diameter_units(width, height)),
            mask: self.mask.clone(),
        }
    }

    fn describe(&self, width: usize, height: usize) -> String {
        format!("Coin Dia: {:.1}cm", self.diameter_units(width, height))
    }
}

/// An estimate together with the mask it came from.
#[derive(Clone, Debug)]
pub struct ObjectOverlay<'a> {
    pub estimate: &'a ObjectEstimate,
    pub mask: Option<Arc<Mask>>,
}

/// Multi-line description of one estimate.
pub fn describe(estimate: &ObjectEstimate) -> String {
    let m = &estimate.measurement;
    match estimate.kind {
        ObjectKind::Individual => format!(
            "Species: {}\nEst. Weight: {:.0}g\nVol: {:.0}cm³",
            estimate.species, estimate.weight, estimate.volume
        ),
        ObjectKind::Pile => format!(
            "Pile Volume: {:.0} cm³\nEst. Weight: {:.1} kg\nBase Dia: {:.1}cm, H: {:.1}cm",
            estimate.volume,
            estimate.weight / 1000.0,
            m.depth_units,
            m.length_units
        ),
        ObjectKind::Counted => format!(
            "Species: {}\nCount: {}\nEst. Weight: {:.0}g",
            estimate.species, estimate.count, estimate.weight
        ),
    }
}

fn caption(estimate: &ObjectEstimate) -> String {
    match estimate.kind {
        ObjectKind::Pile => format!("Pile: {:.0} cm³", estimate.volume),
        _ => format!("{} | {:.0}g", estimate.species, estimate.weight),
    }
}

/// Builds [`ResultEntry`] values in the configured [`OutputMode`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ResultComposer {
    pub mode: OutputMode,
}

impl ResultComposer {
    pub fn new(mode: OutputMode) -> Self {
        Self { mode }
    }

    /// Compose entries for one run.
    ///
    /// Separate mode yields one entry per object, each canvas also showing
    /// the reference; with no objects but a reference it yields a single
    /// reference-only entry. Combined mode yields one entry for everything.
    /// Nothing to show yields no entries.
    pub fn compose(
        &self,
        width: usize,
        height: usize,
        reference: Option<&ReferenceOverlay>,
        objects: &[ObjectOverlay<'_>],
        colors: &mut ColorContext,
    ) -> Vec<ResultEntry> {
        let shapes: Vec<OverlayShape> = objects
            .iter()
            .map(|o| OverlayShape {
                outline: Outline::for_estimate(o.estimate),
                tint: colors.color_for(&o.estimate.species),
                stroke: OBJECT_STROKE,
                label: caption(o.estimate),
                mask: o.mask.clone(),
            })
            .collect();
        let reference_shape = reference.map(|r| r.shape(width, height));
        let scene = |extra: Vec<OverlayShape>| OverlayScene {
            width,
            height,
            shapes: reference_shape.iter().cloned().chain(extra).collect(),
        };

        match self.mode {
            OutputMode::Separate => {
                if objects.is_empty() {
                    return match reference {
                        Some(r) => vec![ResultEntry {
                            description: format!("Reference only: {}", r.describe(width, height)),
                            scene: scene(Vec::new()),
                        }],
                        None => Vec::new(),
                    };
                }
                let prefix = reference
                    .map(|r| format!("Reference: {}\n", r.describe(width, height)))
                    .unwrap_or_default();
                objects
                    .iter()
                    .zip(shapes)
                    .map(|(o, shape)| ResultEntry {
                        description: format!("{prefix}{}", describe(o.estimate)),
                        scene: scene(vec![shape]),
                    })
                    .collect()
            }
            OutputMode::Combined => {
                if objects.is_empty() && reference.is_none() {
                    return Vec::new();
                }
                let mut description = String::new();
                if let Some(r) = reference {
                    let _ = writeln!(description, "Reference: {}", r.describe(width, height));
                }
                for (i, o) in objects.iter().enumerate() {
                    let _ = writeln!(description, "Item {}: {}", i + 1, describe(o.estimate));
                }
                vec![ResultEntry {
                    description,
                    scene: scene(shapes),
                }]
            }
        }
    }
}

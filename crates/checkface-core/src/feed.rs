//! Landmark feed adapter.
//!
//! Normalizes the per-frame output of the external face detector into a
//! [`FrameRecord`] the liveness analyzer consumes. The detector is expected to
//! deliver a bounding box, the face-oval contour, the full set of contour
//! points, eye-open and smiling probabilities, and head pose angles; any of
//! the probabilities or angles may be missing.

use crate::types::{BoundingBox, Point};
use serde::{Deserialize, Serialize};

/// Maximum number of landmark points retained per frame.
pub const MAX_LANDMARK_POINTS: usize = 160;

/// Raw detector output for one frame, as delivered by the frame source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FaceDetection {
    #[serde(default)]
    pub timestamp_ms: Option<u64>,
    pub bounding_box: BoundingBox,
    /// Closed face-oval contour, in detector order.
    #[serde(default)]
    pub face_oval: Vec<Point>,
    /// All contour points (oval, brows, eyes, nose, lips) flattened.
    #[serde(default)]
    pub contour_points: Vec<Point>,
    #[serde(default)]
    pub left_eye_open: Option<f32>,
    #[serde(default)]
    pub right_eye_open: Option<f32>,
    #[serde(default)]
    pub smiling: Option<f32>,
    #[serde(default)]
    pub yaw: Option<f32>,
    #[serde(default)]
    pub pitch: Option<f32>,
    #[serde(default)]
    pub roll: Option<f32>,
}

/// One processed frame. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameRecord {
    pub timestamp_ms: u64,
    pub bbox: BoundingBox,
    pub face_oval: Vec<Point>,
    pub landmarks: Vec<Point>,
    pub left_eye_open: Option<f32>,
    pub right_eye_open: Option<f32>,
    pub smiling: Option<f32>,
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
    pub center: Point,
    pub ratio: f32,
}

impl FrameRecord {
    /// Build a record from a detection. `fallback_ts` is used when the
    /// detector did not stamp the frame.
    pub fn from_detection(detection: &FaceDetection, fallback_ts: u64) -> Self {
        let bbox = detection.bounding_box;
        let landmarks = detection
            .contour_points
            .iter()
            .take(MAX_LANDMARK_POINTS)
            .copied()
            .collect();

        Self {
            timestamp_ms: detection.timestamp_ms.unwrap_or(fallback_ts),
            bbox,
            face_oval: detection.face_oval.clone(),
            landmarks,
            left_eye_open: detection.left_eye_open.filter(|p| p.is_finite()),
            right_eye_open: detection.right_eye_open.filter(|p| p.is_finite()),
            smiling: detection.smiling.filter(|p| p.is_finite()),
            yaw: finite_or_zero(detection.yaw),
            pitch: finite_or_zero(detection.pitch),
            roll: finite_or_zero(detection.roll),
            center: bbox.center(),
            ratio: bbox.ratio(),
        }
    }

    /// Both eye-open probabilities, when the detector reported them.
    pub fn eyes_open(&self) -> Option<(f32, f32)> {
        Some((self.left_eye_open?, self.right_eye_open?))
    }
}

fn finite_or_zero(v: Option<f32>) -> f32 {
    v.filter(|a| a.is_finite()).unwrap_or(0.0)
}

//! Geometric liveness analysis.
//!
//! A photo or a phone screen held in front of the camera behaves like a flat
//! rigid plane. Four independent per-frame signals look for that behaviour:
//!
//! - **Flat edge**: the face-oval contour contains long, abnormally straight
//!   runs (paper or bezel edges cutting through the detected oval).
//! - **Parallax**: the bounding-box area stays constant while yaw changes. A
//!   real head changes its projected area under rotation.
//! - **Planarity**: landmarks of two frames are related by a single affine
//!   transform with near-zero residual.
//! - **Rigidity**: the face translates across the frame while pose angles or
//!   the width/height ratio stay frozen.
//!
//! Any signal marks the frame as spoof-like. Every test degrades to "no
//! signal" when it lacks the history or points it needs.
//!
//! # Threat Coverage
//!
//! - **Targets:** printed photographs and screens moved by hand.
//! - **Does not target:** 3D masks, or a perfectly still replay (handled by
//!   the blink requirement downstream).

use crate::feed::FrameRecord;
use crate::geometry;
use crate::types::Point;
use serde::Serialize;
use std::collections::VecDeque;

/// Track samples kept for parallax and rigidity.
pub const TRACK_CAPACITY: usize = 40;
/// Landmark snapshots kept for planarity.
pub const LANDMARK_TRACK_CAPACITY: usize = 24;

/// Tunable thresholds for the geometric tests.
///
/// The defaults were tuned on handheld phone sessions and are starting
/// points, not invariants.
#[derive(Debug, Clone, PartialEq)]
pub struct LivenessThresholds {
    /// Contour points per curvature window.
    pub flat_window: usize,
    /// Chord deviation (px) below which a window counts as straight.
    pub flat_curvature_px: f32,
    /// Fraction of straight windows needed for a flat edge.
    pub flat_straight_ratio: f32,
    /// Mean curvature must stay below this multiple of `flat_curvature_px`.
    pub flat_mean_factor: f32,
    pub min_contour_points: usize,

    pub parallax_min_yaw_deg: f32,
    /// Relative area change at or below which the face looks 2D.
    pub parallax_max_area_change: f32,
    pub min_track_samples: usize,

    pub planarity_min_shift_px: f32,
    pub planarity_min_yaw_deg: f32,
    pub planarity_max_rmse_px: f32,

    /// Track samples per rigidity check; at least 2 are used.
    pub rigidity_window: usize,
    pub rigidity_min_travel_px: f32,
    pub rigidity_max_pose_variance: f32,
    pub rigidity_max_ratio_variance: f32,

    /// A gap between frames longer than this discards the history.
    pub history_gap_ms: u64,
}

impl Default for LivenessThresholds {
    fn default() -> Self {
        Self {
            flat_window: 5,
            flat_curvature_px: 1.5,
            flat_straight_ratio: 0.55,
            flat_mean_factor: 2.5,
            min_contour_points: 12,
            parallax_min_yaw_deg: 7.0,
            parallax_max_area_change: 0.08,
            min_track_samples: 6,
            planarity_min_shift_px: 8.0,
            planarity_min_yaw_deg: 8.0,
            planarity_max_rmse_px: 0.5,
            rigidity_window: 10,
            rigidity_min_travel_px: 12.0,
            rigidity_max_pose_variance: 2.0,
            rigidity_max_ratio_variance: 0.01,
            history_gap_ms: 1500,
        }
    }
}

/// Per-frame output of [`GeometricAnalyzer::analyze`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FrameSignals {
    pub flat_edge: bool,
    pub straight_ratio: f32,
    pub mean_curvature: f32,
    pub parallax_looks_2d: bool,
    pub is_planar_now: bool,
    /// Affine residual of the planarity fit, when one was computed.
    pub planarity_rmse: Option<f32>,
    pub rigid_pose_2d: bool,
    pub rigid_ratio_2d: bool,
}

impl FrameSignals {
    pub fn spoof_like(&self) -> bool {
        self.flat_edge
            || self.parallax_looks_2d
            || self.is_planar_now
            || self.rigid_pose_2d
            || self.rigid_ratio_2d
    }
}

#[derive(Debug, Clone, Copy)]
struct TrackSample {
    timestamp_ms: u64,
    center: Point,
    area: f32,
    yaw: f32,
    pitch: f32,
    roll: f32,
    ratio: f32,
}

#[derive(Debug, Clone)]
struct LandmarkSnapshot {
    timestamp_ms: u64,
    yaw: f32,
    center: Point,
    points: Vec<Point>,
}

/// Capacity-bounded FIFO; the oldest entry is evicted on overflow.
#[derive(Debug, Clone)]
struct RollingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> RollingBuffer<T> {
    fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, item: T) {
        if self.items.len() == self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn clear(&mut self) {
        self.items.clear();
    }
}

/// Stateful per-session analyzer holding the track histories.
#[derive(Debug, Clone)]
pub struct GeometricAnalyzer {
    thresholds: LivenessThresholds,
    track: RollingBuffer<TrackSample>,
    landmarks: RollingBuffer<LandmarkSnapshot>,
}

impl GeometricAnalyzer {
    pub fn new(thresholds: LivenessThresholds) -> Self {
        Self {
            thresholds,
            track: RollingBuffer::new(TRACK_CAPACITY),
            landmarks: RollingBuffer::new(LANDMARK_TRACK_CAPACITY),
        }
    }

    pub fn thresholds(&self) -> &LivenessThresholds {
        &self.thresholds
    }

    /// Number of track samples currently buffered.
    pub fn track_len(&self) -> usize {
        self.track.len()
    }

    /// Drop all history, e.g. when the face is lost.
    pub fn reset(&mut self) {
        self.track.clear();
        self.landmarks.clear();
    }

    /// Compute the signals for `frame` against the history, then fold the
    /// frame into the buffers.
    pub fn analyze(&mut self, frame: &FrameRecord) -> FrameSignals {
        self.drop_stale_history(frame.timestamp_ms);

        let (flat_edge, straight_ratio, mean_curvature) = self.flat_edge(&frame.face_oval);
        let parallax_looks_2d = self.parallax(frame);
        let planarity_rmse = self.planarity_rmse(frame);

        self.track.push(TrackSample {
            timestamp_ms: frame.timestamp_ms,
            center: frame.center,
            area: frame.bbox.area(),
            yaw: frame.yaw,
            pitch: frame.pitch,
            roll: frame.roll,
            ratio: frame.ratio,
        });
        if !frame.landmarks.is_empty() {
            self.landmarks.push(LandmarkSnapshot {
                timestamp_ms: frame.timestamp_ms,
                yaw: frame.yaw,
                center: frame.center,
                points: frame.landmarks.clone(),
            });
        }

        let (rigid_pose_2d, rigid_ratio_2d) = self.rigidity();

        FrameSignals {
            flat_edge,
            straight_ratio,
            mean_curvature,
            parallax_looks_2d,
            is_planar_now: planarity_rmse
                .is_some_and(|r| r <= self.thresholds.planarity_max_rmse_px),
            planarity_rmse,
            rigid_pose_2d,
            rigid_ratio_2d,
        }
    }

    fn drop_stale_history(&mut self, now_ms: u64) {
        let gap = self.thresholds.history_gap_ms;
        let stale = |last: Option<u64>| last.is_some_and(|ts| now_ms.saturating_sub(ts) > gap);

        if stale(self.track.items.back().map(|s| s.timestamp_ms)) {
            tracing::debug!(now_ms, "track history stale, resetting");
            self.track.clear();
        }
        if stale(self.landmarks.items.back().map(|s| s.timestamp_ms)) {
            self.landmarks.clear();
        }
    }

    /// Returns `(flat_edge, straight_ratio, mean_curvature)`.
    fn flat_edge(&self, contour: &[Point]) -> (bool, f32, f32) {
        let t = &self.thresholds;
        let n = contour.len();
        let window = t.flat_window.max(3);
        if n < t.min_contour_points || n < window {
            return (false, 0.0, 0.0);
        }

        let mut windows = 0usize;
        let mut straight = 0usize;
        let mut curvature_sum = 0.0f32;

        // Closed contour: windows wrap around the end.
        for start in 0..n {
            let first = contour[start];
            let last = contour[(start + window - 1) % n];
            let Some(deviation) = max_chord_deviation(first, last, |k| contour[(start + k) % n], window)
            else {
                continue;
            };
            windows += 1;
            curvature_sum += deviation;
            if deviation < t.flat_curvature_px {
                straight += 1;
            }
        }

        if windows == 0 {
            return (false, 0.0, 0.0);
        }

        let straight_ratio = straight as f32 / windows as f32;
        let mean_curvature = curvature_sum / windows as f32;
        let flat = straight_ratio >= t.flat_straight_ratio
            && mean_curvature < t.flat_mean_factor * t.flat_curvature_px;
        (flat, straight_ratio, mean_curvature)
    }

    fn parallax(&self, frame: &FrameRecord) -> bool {
        let t = &self.thresholds;
        if self.track.len() < t.min_track_samples {
            return false;
        }

        let Some(reference) = self
            .track
            .items
            .iter()
            .rev()
            .find(|s| (s.yaw - frame.yaw).abs() >= t.parallax_min_yaw_deg)
        else {
            return false;
        };

        if reference.area <= 0.0 {
            return false;
        }
        let change = (frame.bbox.area() - reference.area).abs() / reference.area;
        change <= t.parallax_max_area_change
    }

    fn planarity_rmse(&self, frame: &FrameRecord) -> Option<f32> {
        let t = &self.thresholds;
        if frame.landmarks.len() < geometry::MIN_AFFINE_POINTS {
            return None;
        }

        let reference = self.landmarks.items.iter().rev().find(|s| {
            distance(s.center, frame.center) >= t.planarity_min_shift_px
                || (s.yaw - frame.yaw).abs() >= t.planarity_min_yaw_deg
        })?;

        let rmse = geometry::affine_rmse(&reference.points, &frame.landmarks);
        rmse.is_finite().then_some(rmse as f32)
    }

    /// Returns `(rigid_pose_2d, rigid_ratio_2d)` over the most recent window.
    fn rigidity(&self) -> (bool, bool) {
        let t = &self.thresholds;
        if self.track.len() < t.min_track_samples {
            return (false, false);
        }

        let skip = self.track.len().saturating_sub(t.rigidity_window.max(2));
        let recent: Vec<&TrackSample> = self.track.items.iter().skip(skip).collect();
        let origin = recent[0].center;
        let travel = recent
            .iter()
            .map(|s| distance(origin, s.center))
            .fold(0.0f32, f32::max);
        if travel < t.rigidity_min_travel_px {
            return (false, false);
        }

        let pose_var = [
            variance(recent.iter().map(|s| s.yaw)),
            variance(recent.iter().map(|s| s.pitch)),
            variance(recent.iter().map(|s| s.roll)),
        ];
        let rigid_pose = pose_var.iter().all(|&v| v < t.rigidity_max_pose_variance);
        let rigid_ratio = variance(recent.iter().map(|s| s.ratio)) < t.rigidity_max_ratio_variance;

        (rigid_pose, rigid_ratio)
    }
}

impl Default for GeometricAnalyzer {
    fn default() -> Self {
        Self::new(LivenessThresholds::default())
    }
}

/// Largest perpendicular distance of the window's interior points from the
/// chord joining its endpoints. `None` for a degenerate chord.
fn max_chord_deviation(
    first: Point,
    last: Point,
    point_at: impl Fn(usize) -> Point,
    window: usize,
) -> Option<f32> {
    let (cx, cy) = (last.0 - first.0, last.1 - first.1);
    let chord = (cx * cx + cy * cy).sqrt();
    if chord < 1e-3 {
        return None;
    }

    let mut max_dev = 0.0f32;
    for k in 1..window - 1 {
        let (px, py) = point_at(k);
        let cross = (px - first.0) * cy - (py - first.1) * cx;
        max_dev = max_dev.max(cross.abs() / chord);
    }
    Some(max_dev)
}

fn distance(a: Point, b: Point) -> f32 {
    let dx = a.0 - b.0;
    let dy = a.1 - b.1;
    (dx * dx + dy * dy).sqrt()
}

/// Population variance; 0 for an empty sequence.
fn variance(values: impl Iterator<Item = f32> + Clone) -> f32 {
    let n = values.clone().count();
    if n == 0 {
        return 0.0;
    }
    let mean = values.clone().sum::<f32>() / n as f32;
    values.map(|v| (v - mean) * (v - mean)).sum::<f32>() / n as f32
}

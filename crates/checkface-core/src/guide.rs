//! Guide-fit classification against the on-screen oval.

use crate::types::{BoundingBox, Point};
use serde::Serialize;

/// Shrink factor applied to the guide radii for the containment test.
pub const DEFAULT_ELLIPSE_MARGIN: f32 = 0.95;
/// Smallest box dimension, relative to the guide radius.
pub const DEFAULT_MIN_SIZE_RATIO: f32 = 1.0;
/// Largest box dimension, relative to the guide radius.
pub const DEFAULT_MAX_SIZE_RATIO: f32 = 2.0;
/// Maximum normalized distance of the box center from the guide center.
pub const DEFAULT_MAX_CENTER_OFFSET: f32 = 0.8;
/// Consecutive `ok` frames before capture is permitted.
pub const DEFAULT_STABLE_FRAMES: u32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FitState {
    Ok,
    TooSmall,
    TooBig,
    #[default]
    OffCenter,
}

impl FitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::TooSmall => "too_small",
            Self::TooBig => "too_big",
            Self::OffCenter => "off_center",
        }
    }
}

/// Elliptical capture guide in frame pixel coordinates.
///
/// The containment test runs first, so with the default `margin` a box
/// inscribed in the shrunken oval never exceeds about 1.62× either radius.
/// `TooBig` is then unreachable and a face held too close reports
/// `OffCenter`. Raise `margin` (or lower `max_size_ratio`) to surface it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GuideEllipse {
    pub cx: f32,
    pub cy: f32,
    pub rx: f32,
    pub ry: f32,
    pub margin: f32,
    pub min_size_ratio: f32,
    pub max_size_ratio: f32,
    pub max_center_offset: f32,
}

impl GuideEllipse {
    pub fn new(cx: f32, cy: f32, rx: f32, ry: f32) -> Self {
        Self {
            cx,
            cy,
            rx,
            ry,
            margin: DEFAULT_ELLIPSE_MARGIN,
            min_size_ratio: DEFAULT_MIN_SIZE_RATIO,
            max_size_ratio: DEFAULT_MAX_SIZE_RATIO,
            max_center_offset: DEFAULT_MAX_CENTER_OFFSET,
        }
    }

    /// Guide laid out on a screen: centered horizontally at 45% height,
    /// horizontal radius 35% of the shorter side, vertical radius 1.3×.
    pub fn for_screen(width: f32, height: f32) -> Self {
        let rx = width.min(height) * 0.35;
        Self::new(width * 0.5, height * 0.45, rx, rx * 1.3)
    }

    /// Normalized elliptical distance of `p` from the guide center, with the
    /// radii scaled by `scale`. Values ≤ 1 are inside.
    fn normalized_distance(&self, p: Point, scale: f32) -> f32 {
        let dx = (p.0 - self.cx) / (self.rx * scale);
        let dy = (p.1 - self.cy) / (self.ry * scale);
        (dx * dx + dy * dy).sqrt()
    }

    pub fn classify(&self, bbox: &BoundingBox) -> FitState {
        if self.rx <= 0.0 || self.ry <= 0.0 {
            return FitState::OffCenter;
        }

        let outside = bbox
            .extrema()
            .iter()
            .any(|&p| self.normalized_distance(p, self.margin) > 1.0);
        if outside {
            return FitState::OffCenter;
        }

        let w_ratio = bbox.width / self.rx;
        let h_ratio = bbox.height / self.ry;
        if w_ratio.min(h_ratio) < self.min_size_ratio {
            return FitState::TooSmall;
        }
        if w_ratio.max(h_ratio) > self.max_size_ratio {
            return FitState::TooBig;
        }

        if self.normalized_distance(bbox.center(), 1.0) > self.max_center_offset {
            return FitState::OffCenter;
        }

        FitState::Ok
    }
}

/// Counts consecutive `ok` frames.
#[derive(Debug, Clone)]
pub struct StabilityCounter {
    count: u32,
    threshold: u32,
}

impl StabilityCounter {
    pub fn new(threshold: u32) -> Self {
        Self {
            count: 0,
            threshold,
        }
    }

    /// Fold one frame's fit. Returns `true` only on the frame the streak
    /// reaches the threshold.
    pub fn update(&mut self, fit: FitState) -> bool {
        if fit == FitState::Ok {
            self.count = self.count.saturating_add(1);
            self.count == self.threshold
        } else {
            self.count = 0;
            false
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn is_stable(&self) -> bool {
        self.count >= self.threshold
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }
}

impl Default for StabilityCounter {
    fn default() -> Self {
        Self::new(DEFAULT_STABLE_FRAMES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guide() -> GuideEllipse {
        GuideEllipse::new(200.0, 300.0, 100.0, 130.0)
    }

    fn centered(w: f32, h: f32) -> BoundingBox {
        BoundingBox::new(200.0 - w / 2.0, 300.0 - h / 2.0, w, h)
    }

    #[test]
    fn test_centered_box_is_ok() {
        assert_eq!(guide().classify(&centered(110.0, 140.0)), FitState::Ok);
    }

    #[test]
    fn test_small_box_is_too_small() {
        assert_eq!(guide().classify(&centered(60.0, 80.0)), FitState::TooSmall);
    }

    #[test]
    fn test_corner_outside_is_off_center_regardless_of_size() {
        let g = guide();
        // Right size, shifted so the top-right corner leaves the oval.
        let b = BoundingBox::new(200.0, 250.0, 110.0, 140.0);
        assert_eq!(g.classify(&b), FitState::OffCenter);
        // Tiny box, but sitting on the rim.
        let b = BoundingBox::new(290.0, 295.0, 10.0, 10.0);
        assert_eq!(g.classify(&b), FitState::OffCenter);
        // Oversized box covering the whole guide.
        assert_eq!(g.classify(&centered(400.0, 500.0)), FitState::OffCenter);
    }

    #[test]
    fn test_too_big_with_permissive_margin() {
        let mut g = guide();
        g.margin = 3.0;
        assert_eq!(g.classify(&centered(250.0, 300.0)), FitState::TooBig);
    }

    #[test]
    fn test_default_margin_reports_close_face_as_off_center() {
        let g = guide();
        for w in (5..600).step_by(5) {
            for h in (5..600).step_by(5) {
                let fit = g.classify(&centered(w as f32, h as f32));
                assert_ne!(fit, FitState::TooBig, "{w}x{h}");
            }
        }
        assert_eq!(g.classify(&centered(210.0, 270.0)), FitState::OffCenter);
    }

    #[test]
    fn test_center_offset_is_off_center() {
        let mut g = guide();
        g.margin = 3.0;
        g.max_center_offset = 0.1;
        let b = BoundingBox::new(170.0, 260.0, 110.0, 140.0);
        assert_eq!(g.classify(&b), FitState::OffCenter);
    }

    #[test]
    fn test_for_screen_layout() {
        let g = GuideEllipse::for_screen(1080.0, 1920.0);
        assert_eq!(g.cx, 540.0);
        assert!((g.rx - 378.0).abs() < 1e-3);
        assert!((g.ry - 491.4).abs() < 1e-2);
    }

    #[test]
    fn test_stable_stream_crosses_threshold_once() {
        let g = guide();
        let mut counter = StabilityCounter::default();
        let mut crossings = 0;
        for _ in 0..10 {
            let fit = g.classify(&centered(110.0, 140.0));
            assert_eq!(fit, FitState::Ok);
            if counter.update(fit) {
                crossings += 1;
            }
        }
        assert_eq!(crossings, 1);
        assert!(counter.is_stable());

        counter.update(FitState::TooSmall);
        assert_eq!(counter.count(), 0);
        assert!(!counter.is_stable());
    }

    #[test]
    fn test_interrupted_stream_does_not_cross() {
        let mut counter = StabilityCounter::default();
        for i in 0..12 {
            let fit = if i % 5 == 4 { FitState::OffCenter } else { FitState::Ok };
            assert!(!counter.update(fit));
        }
    }
}

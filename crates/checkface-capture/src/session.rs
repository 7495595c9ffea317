//! Per-session liveness state.
//!
//! A [`LivenessSession`] owns every rolling buffer the capture pipeline
//! needs: the geometric analyzer's tracks, both vote windows, the blink log
//! and the guide stability streak. Each processed frame yields an immutable
//! [`FrameState`] snapshot.

use checkface_core::blink::BlinkDetector;
use checkface_core::guide::{FitState, GuideEllipse, StabilityCounter};
use checkface_core::liveness::{FrameSignals, GeometricAnalyzer, LivenessThresholds};
use checkface_core::voting::{Verdict, VoteBuffer};
use checkface_core::{FaceDetection, FrameRecord};
use serde::Serialize;

/// Snapshot of the pipeline after one frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FrameState {
    pub timestamp_ms: u64,
    pub face_present: bool,
    pub fit: FitState,
    pub stable_count: u32,
    /// Guide fit has been `ok` for at least the stability threshold.
    pub stable: bool,
    /// Set only on the frame the stability streak reached its threshold.
    pub became_stable: bool,
    /// Geometric verdict combined with the planarity verdict.
    pub verdict: Verdict,
    pub planarity_verdict: Verdict,
    pub recent_blink: bool,
    pub blink_count: usize,
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
    pub smiling: Option<f32>,
    pub signals: Option<FrameSignals>,
}

#[derive(Debug, Clone)]
pub struct LivenessSession {
    analyzer: GeometricAnalyzer,
    votes: VoteBuffer,
    planarity_votes: VoteBuffer,
    blink: BlinkDetector,
    guide: GuideEllipse,
    stability: StabilityCounter,
}

impl LivenessSession {
    pub fn new(guide: GuideEllipse, thresholds: LivenessThresholds, stable_frames: u32) -> Self {
        Self {
            analyzer: GeometricAnalyzer::new(thresholds),
            votes: VoteBuffer::default(),
            planarity_votes: VoteBuffer::default(),
            blink: BlinkDetector::default(),
            guide,
            stability: StabilityCounter::new(stable_frames),
        }
    }

    pub fn guide(&self) -> &GuideEllipse {
        &self.guide
    }

    /// Fold one frame. `None` means the detector found no face; the
    /// stability streak breaks but the vote and blink history survive.
    pub fn process(&mut self, detection: Option<&FaceDetection>, now_ms: u64) -> FrameState {
        let Some(detection) = detection else {
            self.stability.reset();
            let recent_blink = self.blink.has_recent_blink(now_ms);
            return FrameState {
                timestamp_ms: now_ms,
                fit: FitState::OffCenter,
                verdict: self.verdict(),
                planarity_verdict: self.planarity_votes.verdict(),
                recent_blink,
                blink_count: self.blink.blink_count(),
                ..FrameState::default()
            };
        };

        let frame = FrameRecord::from_detection(detection, now_ms);
        let ts = frame.timestamp_ms;

        let signals = self.analyzer.analyze(&frame);
        self.votes.push(signals.spoof_like());
        if signals.planarity_rmse.is_some_and(f32::is_finite) {
            self.planarity_votes.push(signals.is_planar_now);
        }

        self.blink.update(frame.eyes_open(), ts);
        let recent_blink = self.blink.has_recent_blink(ts);

        let fit = self.guide.classify(&frame.bbox);
        let became_stable = self.stability.update(fit);
        if became_stable {
            tracing::debug!(frames = self.stability.threshold(), "face stable in guide");
        }

        let state = FrameState {
            timestamp_ms: ts,
            face_present: true,
            fit,
            stable_count: self.stability.count(),
            stable: self.stability.is_stable(),
            became_stable,
            verdict: self.verdict(),
            planarity_verdict: self.planarity_votes.verdict(),
            recent_blink,
            blink_count: self.blink.blink_count(),
            yaw: frame.yaw,
            pitch: frame.pitch,
            roll: frame.roll,
            smiling: frame.smiling,
            signals: Some(signals),
        };

        tracing::trace!(
            ts,
            fit = fit.as_str(),
            verdict = state.verdict.as_str(),
            spoof_votes = self.votes.spoof_votes(),
            recent_blink,
            "frame processed"
        );
        state
    }

    fn verdict(&self) -> Verdict {
        self.votes.verdict().combine(self.planarity_votes.verdict())
    }

    /// Drop all history, e.g. when the capture mode changes.
    pub fn reset(&mut self) {
        self.analyzer.reset();
        self.votes.clear();
        self.planarity_votes.clear();
        self.blink.reset();
        self.stability.reset();
    }
}

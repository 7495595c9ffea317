//! Guided capture steps.
//!
//! Each step polls the latest [`FrameState`] until its condition has held
//! continuously for the hold period, then takes exactly one photo. A step
//! that never holds within the timeout fails with its own reason.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::camera::PhotoCapture;
use crate::failure::CaptureFailure;
use crate::session::FrameState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Face looking straight at the camera.
    Front,
    Smile,
    Blink,
    /// Any face in frame.
    Frame,
}

impl Step {
    /// Failure reported when the step times out with frames arriving.
    pub fn failure(&self) -> CaptureFailure {
        match self {
            Self::Front => CaptureFailure::FaceNotFront,
            Self::Smile => CaptureFailure::SmileNotDetected,
            Self::Blink => CaptureFailure::BlinkNotDetected,
            Self::Frame => CaptureFailure::FaceNotCentered,
        }
    }

    pub fn is_satisfied(&self, state: &FrameState, policy: &StepPolicy) -> bool {
        if !state.face_present {
            return false;
        }
        match self {
            Self::Front => {
                state.yaw.abs() <= policy.front_tolerance_deg
                    && state.roll.abs() <= policy.front_tolerance_deg
            }
            Self::Smile => state.smiling.is_some_and(|s| s >= policy.smile_threshold),
            Self::Blink => state.recent_blink,
            Self::Frame => true,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Front => "front",
            Self::Smile => "smile",
            Self::Blink => "blink",
            Self::Frame => "frame",
        }
    }
}

impl FromStr for Step {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "front" => Ok(Self::Front),
            "smile" => Ok(Self::Smile),
            "blink" => Ok(Self::Blink),
            "frame" => Ok(Self::Frame),
            other => Err(format!("unknown step: {other} (expected front, smile, blink or frame)")),
        }
    }
}

/// Timing and thresholds shared by all steps.
#[derive(Debug, Clone, PartialEq)]
pub struct StepPolicy {
    pub hold: Duration,
    pub timeout: Duration,
    pub poll: Duration,
    pub front_tolerance_deg: f32,
    pub smile_threshold: f32,
}

impl Default for StepPolicy {
    fn default() -> Self {
        Self {
            hold: Duration::from_millis(350),
            timeout: Duration::from_secs(8),
            poll: Duration::from_millis(50),
            front_tolerance_deg: 12.0,
            smile_threshold: 0.6,
        }
    }
}

/// Wait until `step` holds for `policy.hold`. Fails with
/// `camera_not_ready` when no frame ever arrived, otherwise with the step's
/// own failure.
pub async fn wait_for_step(
    step: Step,
    frames: &mut watch::Receiver<Option<FrameState>>,
    policy: &StepPolicy,
) -> Result<(), CaptureFailure> {
    let started = Instant::now();
    let mut held_since: Option<Instant> = None;
    let mut saw_frame = false;

    loop {
        let now = Instant::now();
        let satisfied = {
            let latest = frames.borrow_and_update();
            match latest.as_ref() {
                Some(state) => {
                    saw_frame = true;
                    step.is_satisfied(state, policy)
                }
                None => false,
            }
        };

        if satisfied {
            let since = *held_since.get_or_insert(now);
            if now.duration_since(since) >= policy.hold {
                tracing::debug!(step = step.as_str(), "step satisfied");
                return Ok(());
            }
        } else {
            held_since = None;
        }

        if now.duration_since(started) >= policy.timeout {
            let failure = if saw_frame {
                step.failure()
            } else {
                CaptureFailure::CameraNotReady
            };
            tracing::info!(step = step.as_str(), reason = failure.code(), "step timed out");
            return Err(failure);
        }

        tokio::time::sleep(policy.poll).await;
    }
}

/// Wait for `step`, then take exactly one photo.
pub async fn capture_step<C>(
    step: Step,
    frames: &mut watch::Receiver<Option<FrameState>>,
    policy: &StepPolicy,
    camera: &C,
) -> Result<PathBuf, CaptureFailure>
where
    C: PhotoCapture + ?Sized,
{
    wait_for_step(step, frames, policy).await?;
    camera.take_photo().await.map_err(|e| {
        tracing::warn!(step = step.as_str(), error = %e, "photo capture failed");
        CaptureFailure::CaptureFailed
    })
}

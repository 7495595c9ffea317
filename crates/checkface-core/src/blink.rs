//! Blink detection from detector eye-open probabilities.
//!
//! A blink is both eyes dropping below the close threshold for at least
//! `min_closed_frames` detection cycles and then reopening above the open
//! threshold. Reopening also rearms the detector for the next blink. Values
//! between the two thresholds keep the current phase (hysteresis).

use std::collections::VecDeque;
use tracing::debug;

pub const DEFAULT_CLOSE_THRESHOLD: f32 = 0.28;
pub const DEFAULT_OPEN_THRESHOLD: f32 = 0.65;
pub const DEFAULT_BLINK_WINDOW_MS: u64 = 6000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EyePhase {
    /// No open observation yet; a closure cannot count.
    Unarmed,
    Open,
    Closed { since_ms: u64, frames: u32 },
}

#[derive(Debug, Clone)]
pub struct BlinkDetector {
    close_threshold: f32,
    open_threshold: f32,
    min_closed_frames: u32,
    window_ms: u64,
    phase: EyePhase,
    /// Timestamps of registered blinks, oldest first.
    events: VecDeque<u64>,
}

impl BlinkDetector {
    pub fn new(close_threshold: f32, open_threshold: f32, window_ms: u64) -> Self {
        Self {
            close_threshold,
            open_threshold,
            min_closed_frames: 1,
            window_ms,
            phase: EyePhase::Unarmed,
            events: VecDeque::new(),
        }
    }

    /// Feed one frame. Returns `true` when this frame completed a blink.
    /// Frames without eye probabilities only age the event log.
    pub fn update(&mut self, eyes: Option<(f32, f32)>, now_ms: u64) -> bool {
        self.prune(now_ms);
        let Some((left, right)) = eyes else {
            return false;
        };

        let both_closed = left < self.close_threshold && right < self.close_threshold;
        let reopened = left > self.open_threshold || right > self.open_threshold;

        match self.phase {
            EyePhase::Unarmed if reopened => self.phase = EyePhase::Open,
            EyePhase::Open if both_closed => {
                self.phase = EyePhase::Closed {
                    since_ms: now_ms,
                    frames: 1,
                };
            }
            EyePhase::Closed { since_ms, frames } if both_closed => {
                self.phase = EyePhase::Closed {
                    since_ms,
                    frames: frames + 1,
                };
            }
            EyePhase::Closed { since_ms, frames } if reopened => {
                self.phase = EyePhase::Open;
                if frames >= self.min_closed_frames {
                    self.events.push_back(now_ms);
                    debug!(
                        closed_ms = now_ms.saturating_sub(since_ms),
                        closed_frames = frames,
                        "blink registered"
                    );
                    return true;
                }
            }
            _ => {}
        }
        false
    }

    /// Whether a blink was registered within the window ending at `now_ms`.
    pub fn has_recent_blink(&mut self, now_ms: u64) -> bool {
        self.prune(now_ms);
        !self.events.is_empty()
    }

    pub fn blink_count(&self) -> usize {
        self.events.len()
    }

    pub fn reset(&mut self) {
        self.phase = EyePhase::Unarmed;
        self.events.clear();
    }

    fn prune(&mut self, now_ms: u64) {
        while let Some(&ts) = self.events.front() {
            if now_ms.saturating_sub(ts) > self.window_ms {
                self.events.pop_front();
            } else {
                break;
            }
        }
    }
}

impl Default for BlinkDetector {
    fn default() -> Self {
        Self::new(
            DEFAULT_CLOSE_THRESHOLD,
            DEFAULT_OPEN_THRESHOLD,
            DEFAULT_BLINK_WINDOW_MS,
        )
    }
}

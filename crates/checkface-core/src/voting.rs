//! Temporal voting over per-frame liveness signals.
//!
//! Single frames are noisy; the verdict is debounced over a sliding window
//! of boolean "spoof-like" votes.

use serde::Serialize;
use std::collections::VecDeque;

pub const DEFAULT_WINDOW: usize = 15;
pub const DEFAULT_DECISION_VOTES: usize = 9;
pub const DEFAULT_MIN_SAMPLES: usize = 6;

/// Debounced liveness verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    LikelyReal,
    LikelyPaperOrScreen,
    #[default]
    Unknown,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LikelyReal => "likely_real",
            Self::LikelyPaperOrScreen => "likely_paper_or_screen",
            Self::Unknown => "unknown",
        }
    }

    /// Combine two verdicts; a spoof verdict from either side wins.
    pub fn combine(self, other: Verdict) -> Verdict {
        match (self, other) {
            (Self::LikelyPaperOrScreen, _) | (_, Self::LikelyPaperOrScreen) => {
                Self::LikelyPaperOrScreen
            }
            (v, _) => v,
        }
    }
}

/// Fixed-length sliding window of spoof votes.
#[derive(Debug, Clone)]
pub struct VoteBuffer {
    votes: VecDeque<bool>,
    window: usize,
    decision_votes: usize,
    min_samples: usize,
}

impl VoteBuffer {
    pub fn new(window: usize, decision_votes: usize, min_samples: usize) -> Self {
        Self {
            votes: VecDeque::with_capacity(window),
            window,
            decision_votes,
            min_samples,
        }
    }

    /// Push one vote; `true` means the frame looked spoof-like.
    pub fn push(&mut self, spoof_like: bool) {
        if self.votes.len() == self.window {
            self.votes.pop_front();
        }
        self.votes.push_back(spoof_like);
    }

    pub fn len(&self) -> usize {
        self.votes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    pub fn spoof_votes(&self) -> usize {
        self.votes.iter().filter(|&&v| v).count()
    }

    pub fn verdict(&self) -> Verdict {
        if self.votes.len() < self.min_samples {
            return Verdict::Unknown;
        }
        let spoof = self.spoof_votes();
        let real = self.votes.len() - spoof;
        if spoof >= self.decision_votes {
            Verdict::LikelyPaperOrScreen
        } else if real >= self.decision_votes {
            Verdict::LikelyReal
        } else {
            Verdict::Unknown
        }
    }

    pub fn clear(&mut self) {
        self.votes.clear();
    }
}

impl Default for VoteBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW, DEFAULT_DECISION_VOTES, DEFAULT_MIN_SAMPLES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nine_spoof_votes_is_paper() {
        let mut buf = VoteBuffer::default();
        for _ in 0..9 {
            buf.push(true);
        }
        assert_eq!(buf.verdict(), Verdict::LikelyPaperOrScreen);
    }

    #[test]
    fn test_nine_live_votes_is_real() {
        let mut buf = VoteBuffer::default();
        for _ in 0..9 {
            buf.push(false);
        }
        assert_eq!(buf.verdict(), Verdict::LikelyReal);
    }

    #[test]
    fn test_alternating_is_unknown() {
        let mut buf = VoteBuffer::default();
        for i in 0..30 {
            buf.push(i % 2 == 0);
            assert_eq!(buf.verdict(), Verdict::Unknown, "after {} votes", i + 1);
        }
    }

    #[test]
    fn test_startup_below_min_samples_is_unknown() {
        let mut buf = VoteBuffer::new(15, 3, 6);
        for _ in 0..5 {
            buf.push(true);
            assert_eq!(buf.verdict(), Verdict::Unknown);
        }
        buf.push(true);
        assert_eq!(buf.verdict(), Verdict::LikelyPaperOrScreen);
    }

    #[test]
    fn test_window_evicts_old_votes() {
        let mut buf = VoteBuffer::default();
        for _ in 0..15 {
            buf.push(true);
        }
        for _ in 0..15 {
            buf.push(false);
        }
        assert_eq!(buf.len(), 15);
        assert_eq!(buf.spoof_votes(), 0);
        assert_eq!(buf.verdict(), Verdict::LikelyReal);
    }

    #[test]
    fn test_combine_prefers_spoof() {
        assert_eq!(
            Verdict::LikelyReal.combine(Verdict::LikelyPaperOrScreen),
            Verdict::LikelyPaperOrScreen
        );
        assert_eq!(Verdict::LikelyReal.combine(Verdict::Unknown), Verdict::LikelyReal);
        assert_eq!(Verdict::Unknown.combine(Verdict::LikelyReal), Verdict::Unknown);
    }
}

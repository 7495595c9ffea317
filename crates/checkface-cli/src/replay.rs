//! Recorded detector sessions.
//!
//! A session file holds one JSON value per line: a `FaceDetection` object,
//! or `null` for a frame without a face.

use anyhow::{Context, Result};
use checkface_capture::{AnalyzerFeed, Config, LivenessSession};
use checkface_core::{FaceDetection, LivenessThresholds};
use std::path::Path;
use std::time::Duration;

/// Spacing assumed between frames without a timestamp.
pub const FRAME_INTERVAL_MS: u64 = 33;

pub fn load_detections(path: &Path) -> Result<Vec<Option<FaceDetection>>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str::<Option<FaceDetection>>(line)
                .with_context(|| format!("{}:{}: invalid detection", path.display(), i + 1))
        })
        .collect()
}

pub fn new_feed(config: &Config) -> AnalyzerFeed {
    AnalyzerFeed::new(LivenessSession::new(
        config.guide(),
        LivenessThresholds::default(),
        config.stable_frames,
    ))
}

/// Timestamp for frame `index`: its own, or the fixed spacing.
pub fn frame_time(detection: Option<&FaceDetection>, index: usize) -> u64 {
    detection
        .and_then(|d| d.timestamp_ms)
        .unwrap_or(index as u64 * FRAME_INTERVAL_MS)
}

pub fn frame_interval() -> Duration {
    Duration::from_millis(FRAME_INTERVAL_MS)
}

/// Run the replay command: print one frame state per line.
pub fn run(path: &Path, config: &Config, json: bool) -> Result<()> {
    let detections = load_detections(path)?;
    let mut feed = new_feed(config);

    for (i, detection) in detections.iter().enumerate() {
        let state = feed.on_frame(detection.as_ref(), frame_time(detection.as_ref(), i));
        if json {
            println!("{}", serde_json::to_string(&state)?);
        } else {
            println!(
                "{:>7}  face={:<5}  fit={:<10}  stable={:>2}  verdict={:<22}  blink={}",
                state.timestamp_ms,
                state.face_present,
                state.fit.as_str(),
                state.stable_count,
                state.verdict.as_str(),
                state.recent_blink,
            );
        }
    }

    tracing::info!(frames = detections.len(), "replay finished");
    Ok(())
}

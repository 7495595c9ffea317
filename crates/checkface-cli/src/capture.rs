//! `checkface capture`: drive the capture state machine from a recorded
//! session, using a still image as the camera.
//!
//! With `--enroll NAME` the first capture enrolls and later streaks
//! recognize against the in-memory gallery.

use anyhow::{Context, Result};
use checkface_capture::{
    spawn_engine, CaptureLease, CaptureMachine, CaptureMode, CaptureOutcome, Config,
    StillImageCamera,
};
use std::path::Path;
use std::sync::Arc;

use crate::replay;

pub async fn run(path: &Path, photo: &Path, enroll: Option<String>, config: &Config) -> Result<()> {
    let detections = replay::load_detections(path)?;

    let engine = spawn_engine(&config.arcface_model_path()).context("failed to start engine")?;
    let camera = StillImageCamera::new(photo, std::env::temp_dir().join("checkface-captures"));
    let mut machine = CaptureMachine::new(
        Arc::new(camera),
        Arc::new(engine),
        CaptureLease::new(config.lease_timeout()),
        config.similarity_threshold,
    );
    machine.set_mode(match enroll {
        Some(name) => CaptureMode::Enroll { name },
        None => CaptureMode::Recognize,
    });

    let mut feed = replay::new_feed(config);
    let mut ticker = tokio::time::interval(replay::frame_interval());
    let mut captures = 0usize;

    for (i, detection) in detections.iter().enumerate() {
        ticker.tick().await;
        let state = feed.on_frame(detection.as_ref(), replay::frame_time(detection.as_ref(), i));
        let Some(cycle) = machine.on_frame(&state) else {
            continue;
        };

        captures += 1;
        match cycle.outcome().await {
            CaptureOutcome::Enrolled(face) => {
                println!("{:>7}  enrolled {} ({})", state.timestamp_ms, face.display_name, face.id);
                machine.set_mode(CaptureMode::Recognize);
            }
            CaptureOutcome::Recognized(result) => println!(
                "{:>7}  recognized {} (similarity {:.3})",
                state.timestamp_ms,
                result.display_name.as_deref().unwrap_or("?"),
                result.similarity
            ),
            CaptureOutcome::NoMatch(result) => println!(
                "{:>7}  no match (best similarity {:.3})",
                state.timestamp_ms, result.similarity
            ),
            CaptureOutcome::Failed(reason) => {
                println!("{:>7}  failed: {}", state.timestamp_ms, reason.code())
            }
        }
    }

    tracing::info!(frames = detections.len(), captures, "capture replay finished");
    if captures == 0 {
        println!("no capture triggered (face never stable with a recent blink)");
    }
    Ok(())
}

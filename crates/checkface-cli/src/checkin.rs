//! `checkface check-in`: guided check-in against HTTP endpoints, with frames
//! replayed from a recorded session and a still image as the camera.

use anyhow::{Context, Result};
use checkface_capture::{
    spawn_engine, CheckInFlow, CheckType, Config, HttpAttendanceSink, HttpUploader,
    StillImageCamera, Step,
};
use std::path::Path;
use std::sync::Arc;

use crate::replay;

pub async fn run(
    path: &Path,
    photo: &Path,
    check_type: CheckType,
    steps: Vec<Step>,
    config: &Config,
) -> Result<()> {
    let upload_url = config
        .upload_url
        .clone()
        .context("CHECKFACE_UPLOAD_URL is not set")?;
    let submit_url = config
        .submit_url
        .clone()
        .context("CHECKFACE_SUBMIT_URL is not set")?;

    let detections = replay::load_detections(path)?;
    let engine = spawn_engine(&config.arcface_model_path()).context("failed to start engine")?;

    let mut feed = replay::new_feed(config);
    let frames = feed.subscribe();

    // Frame source: replay at camera pace, keep the last state published.
    let source = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(replay::frame_interval());
        for (i, detection) in detections.iter().enumerate() {
            ticker.tick().await;
            feed.on_frame(detection.as_ref(), replay::frame_time(detection.as_ref(), i));
        }
        tracing::debug!("recorded session exhausted");
        feed
    });

    let mut flow = CheckInFlow::new(
        Arc::new(StillImageCamera::new(
            photo,
            std::env::temp_dir().join("checkface-captures"),
        )),
        Arc::new(engine),
        Arc::new(HttpUploader::new(upload_url)),
        Arc::new(HttpAttendanceSink::new(submit_url)),
        frames,
        config.step_policy(),
    );
    if !steps.is_empty() {
        flow = flow.with_steps(steps);
    }

    let result = flow.run(check_type).await;
    source.abort();

    let receipt = result.context("check-in failed")?;
    println!("{}", serde_json::to_string_pretty(&receipt)?);
    Ok(())
}

//! Attendance check-in: guided capture, embedding, upload, submission.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

use crate::camera::PhotoCapture;
use crate::engine::EmbeddingSource;
use crate::failure::CaptureFailure;
use crate::session::FrameState;
use crate::steps::{capture_step, Step, StepPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckType {
    CheckIn,
    CheckOut,
}

/// Payload accepted by the attendance endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceSubmission {
    #[serde(rename = "type")]
    pub check_type: CheckType,
    pub embedding: Vec<f32>,
    pub image_url: String,
}

/// What a successful check-in hands back to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct CheckInReceipt {
    pub check_type: CheckType,
    pub image_url: String,
    pub photo: PathBuf,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Error, Debug)]
pub enum CollaboratorError {
    #[error("http: {0}")]
    Http(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("background task failed: {0}")]
    Join(String),
}

impl From<ureq::Error> for CollaboratorError {
    fn from(e: ureq::Error) -> Self {
        Self::Http(e.to_string())
    }
}

#[derive(Error, Debug)]
pub enum CheckInError {
    #[error("capture failed: {}", .0.code())]
    Capture(#[from] CaptureFailure),
    #[error("attendance submission failed: {0}")]
    Submit(#[source] CollaboratorError),
}

#[async_trait]
pub trait ImageUploader: Send + Sync {
    /// Upload a local image and return its public URL.
    async fn upload(&self, image: &Path) -> Result<String, CollaboratorError>;
}

#[async_trait]
pub trait AttendanceSink: Send + Sync {
    async fn submit(&self, submission: &AttendanceSubmission) -> Result<(), CollaboratorError>;
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    url: String,
}

/// Uploads the raw image bytes with a POST and reads `{"url": ...}` back.
#[derive(Debug, Clone)]
pub struct HttpUploader {
    url: String,
}

impl HttpUploader {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl ImageUploader for HttpUploader {
    async fn upload(&self, image: &Path) -> Result<String, CollaboratorError> {
        let bytes = tokio::fs::read(image).await?;
        let content_type = match image.extension().and_then(|e| e.to_str()) {
            Some("png") => "image/png",
            _ => "image/jpeg",
        };
        let url = self.url.clone();

        let uploaded = tokio::task::spawn_blocking(move || -> Result<String, CollaboratorError> {
            let mut resp = ureq::post(&url)
                .header("Content-Type", content_type)
                .send(&bytes[..])?;
            let body: UploadResponse = resp.body_mut().read_json()?;
            Ok(body.url)
        })
        .await
        .map_err(|e| CollaboratorError::Join(e.to_string()))??;

        tracing::debug!(image = %image.display(), url = %uploaded, "image uploaded");
        Ok(uploaded)
    }
}

/// Posts the submission as JSON.
#[derive(Debug, Clone)]
pub struct HttpAttendanceSink {
    url: String,
}

impl HttpAttendanceSink {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl AttendanceSink for HttpAttendanceSink {
    async fn submit(&self, submission: &AttendanceSubmission) -> Result<(), CollaboratorError> {
        let url = self.url.clone();
        let payload = submission.clone();

        tokio::task::spawn_blocking(move || -> Result<(), CollaboratorError> {
            ureq::post(&url).send_json(&payload)?;
            Ok(())
        })
        .await
        .map_err(|e| CollaboratorError::Join(e.to_string()))?
    }
}

/// One guided check-in: steps, last photo, embedding, upload, submission.
pub struct CheckInFlow {
    camera: Arc<dyn PhotoCapture>,
    extractor: Arc<dyn EmbeddingSource>,
    uploader: Arc<dyn ImageUploader>,
    sink: Arc<dyn AttendanceSink>,
    frames: watch::Receiver<Option<FrameState>>,
    policy: StepPolicy,
    steps: Vec<Step>,
}

impl CheckInFlow {
    pub fn new(
        camera: Arc<dyn PhotoCapture>,
        extractor: Arc<dyn EmbeddingSource>,
        uploader: Arc<dyn ImageUploader>,
        sink: Arc<dyn AttendanceSink>,
        frames: watch::Receiver<Option<FrameState>>,
        policy: StepPolicy,
    ) -> Self {
        Self {
            camera,
            extractor,
            uploader,
            sink,
            frames,
            policy,
            steps: vec![Step::Front, Step::Blink],
        }
    }

    /// Replace the step sequence. An empty sequence falls back to `frame`.
    pub fn with_steps(mut self, steps: Vec<Step>) -> Self {
        self.steps = if steps.is_empty() { vec![Step::Frame] } else { steps };
        self
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Run the flow once. A failed submission is reported, never retried.
    ///
    /// Each step takes a photo but only the last one is kept; earlier ones
    /// are deleted as they are superseded or when a later step fails.
    pub async fn run(&mut self, check_type: CheckType) -> Result<CheckInReceipt, CheckInError> {
        let mut photo: Option<PathBuf> = None;
        for &step in &self.steps {
            let taken =
                match capture_step(step, &mut self.frames, &self.policy, self.camera.as_ref()).await {
                    Ok(taken) => taken,
                    Err(failure) => {
                        if let Some(previous) = photo.take() {
                            discard_photo(&previous).await;
                        }
                        return Err(failure.into());
                    }
                };
            tracing::info!(step = step.as_str(), photo = %taken.display(), "check-in step done");
            if let Some(previous) = photo.take().filter(|p| *p != taken) {
                discard_photo(&previous).await;
            }
            photo = Some(taken);
        }
        let photo = photo.ok_or(CaptureFailure::CaptureFailed)?;

        let embedding = self.extractor.extract(&photo).await.map_err(|e| {
            tracing::warn!(error = %e, "check-in embedding failed");
            CaptureFailure::FaceidError
        })?;

        let image_url = self.uploader.upload(&photo).await.map_err(|e| {
            tracing::warn!(error = %e, "check-in upload failed");
            CaptureFailure::UploadError
        })?;

        let submission = AttendanceSubmission {
            check_type,
            embedding: embedding.values,
            image_url: image_url.clone(),
        };
        self.sink.submit(&submission).await.map_err(|e| {
            tracing::error!(error = %e, "attendance submission failed");
            CheckInError::Submit(e)
        })?;

        tracing::info!(?check_type, image_url = %image_url, "attendance submitted");
        Ok(CheckInReceipt {
            check_type,
            image_url,
            photo,
            submitted_at: Utc::now(),
        })
    }
}

async fn discard_photo(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        tracing::debug!(photo = %path.display(), error = %e, "superseded photo not removed");
    }
}

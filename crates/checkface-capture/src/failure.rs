use serde::Serialize;
use thiserror::Error;

/// Why a capture attempt or a check-in step did not produce a result.
///
/// Serialized as the snake_case code the front end localizes.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureFailure {
    #[error("camera is not ready")]
    CameraNotReady,
    #[error("face is not inside the guide")]
    FaceNotCentered,
    #[error("face is not looking at the camera")]
    FaceNotFront,
    #[error("no smile detected")]
    SmileNotDetected,
    #[error("no blink detected")]
    BlinkNotDetected,
    #[error("photo capture failed")]
    CaptureFailed,
    #[error("face embedding could not be extracted")]
    FaceidError,
    #[error("image upload failed")]
    UploadError,
}

impl CaptureFailure {
    pub fn code(&self) -> &'static str {
        match self {
            Self::CameraNotReady => "camera_not_ready",
            Self::FaceNotCentered => "face_not_centered",
            Self::FaceNotFront => "face_not_front",
            Self::SmileNotDetected => "smile_not_detected",
            Self::BlinkNotDetected => "blink_not_detected",
            Self::CaptureFailed => "capture_failed",
            Self::FaceidError => "faceid_error",
            Self::UploadError => "upload_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_matches_serialized_form() {
        for failure in [
            CaptureFailure::CameraNotReady,
            CaptureFailure::FaceNotCentered,
            CaptureFailure::FaceNotFront,
            CaptureFailure::SmileNotDetected,
            CaptureFailure::BlinkNotDetected,
            CaptureFailure::CaptureFailed,
            CaptureFailure::FaceidError,
            CaptureFailure::UploadError,
        ] {
            let json = serde_json::to_string(&failure).unwrap();
            assert_eq!(json, format!("\"{}\"", failure.code()));
        }
    }
}

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::attendance::CollaboratorError;

/// Photo-taking side of the camera. Returns a local image file.
#[async_trait]
pub trait PhotoCapture: Send + Sync {
    async fn take_photo(&self) -> Result<PathBuf, CollaboratorError>;
}

/// Camera stand-in that "takes" a photo by copying a fixed image into the
/// output directory under a timestamped name. Used for replayed sessions.
#[derive(Debug, Clone)]
pub struct StillImageCamera {
    source: PathBuf,
    out_dir: PathBuf,
}

impl StillImageCamera {
    pub fn new(source: impl Into<PathBuf>, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            out_dir: out_dir.into(),
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }
}

#[async_trait]
impl PhotoCapture for StillImageCamera {
    async fn take_photo(&self) -> Result<PathBuf, CollaboratorError> {
        let ext = self
            .source
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("jpg");
        let name = format!(
            "capture-{}.{ext}",
            chrono::Utc::now().format("%Y%m%dT%H%M%S%.3f")
        );
        let dest = self.out_dir.join(name);

        tokio::fs::create_dir_all(&self.out_dir).await?;
        tokio::fs::copy(&self.source, &dest).await?;
        tracing::debug!(photo = %dest.display(), "photo captured");
        Ok(dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn still_camera_copies_source() {
        let dir = std::env::temp_dir().join(format!(
            "checkface-camera-test-{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let source = dir.join("face.png");
        std::fs::write(&source, b"png bytes").unwrap();

        let camera = StillImageCamera::new(&source, dir.join("out"));
        let photo = camera.take_photo().await.unwrap();
        assert_eq!(photo.extension().and_then(|e| e.to_str()), Some("png"));
        assert_eq!(std::fs::read(&photo).unwrap(), b"png bytes");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn missing_source_is_an_error() {
        let camera = StillImageCamera::new("/nonexistent/face.jpg", std::env::temp_dir());
        assert!(camera.take_photo().await.is_err());
    }
}

use async_trait::async_trait;
use checkface_core::{Embedding, FaceEmbedder, RecognizerError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Anything that turns a captured photo into an embedding.
#[async_trait]
pub trait EmbeddingSource: Send + Sync {
    async fn extract(&self, photo: &Path) -> Result<Embedding, EngineError>;
}

/// Messages sent from capture tasks to the engine thread.
enum EngineRequest {
    Extract {
        photo: PathBuf,
        reply: oneshot::Sender<Result<Embedding, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone, Debug)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl std::fmt::Debug for EngineRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Extract { photo, .. } => f.debug_struct("Extract").field("photo", photo).finish(),
        }
    }
}

#[async_trait]
impl EmbeddingSource for EngineHandle {
    /// Request extraction: decode the photo, preprocess, run the model.
    async fn extract(&self, photo: &Path) -> Result<Embedding, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Extract {
                photo: photo.to_path_buf(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// Loads the shared ArcFace session (provider fallback and warm-up included)
/// before returning, so a missing or broken model fails fast at startup.
pub fn spawn_engine(arcface_path: &str) -> Result<EngineHandle, EngineError> {
    let embedder = FaceEmbedder::shared(arcface_path)?;
    tracing::info!(
        path = arcface_path,
        provider = embedder.provider(),
        "ArcFace recognizer loaded"
    );
    spawn_with(embedder)
}

fn spawn_with(embedder: Arc<FaceEmbedder>) -> Result<EngineHandle, EngineError> {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("checkface-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Extract { photo, reply } => {
                        let result = embedder.extract_from_path(&photo).map_err(EngineError::from);
                        if let Err(e) = &result {
                            tracing::warn!(photo = %photo.display(), error = %e, "extraction failed");
                        }
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}

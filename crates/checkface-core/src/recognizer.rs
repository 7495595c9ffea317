//! ArcFace embedding extraction via ONNX Runtime.
//!
//! Turns a captured photo into a 512-dimensional embedding with the
//! w600k_r50 ArcFace model. The session is created once per process,
//! trying execution providers in platform order, and warmed up with one
//! throwaway inference so the first real capture does not pay the graph
//! initialization cost.

use crate::pool::TensorPool;
use crate::preprocess::{self, INPUT_SIZE};
use crate::types::{Embedding, EMBEDDING_DIM};
use image::DynamicImage;
use ndarray::Array4;
use ort::execution_providers::{
    CPUExecutionProvider, CUDAExecutionProvider, CoreMLExecutionProvider,
    ExecutionProviderDispatch, XNNPACKExecutionProvider,
};
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use thiserror::Error;

const ARCFACE_MODEL_VERSION: &str = "w600k_r50";
const INTRA_THREADS: usize = 2;

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("model file not found: {0} (run `checkface setup` first)")]
    ModelNotFound(String),
    #[error("no execution provider could load {path}: {last_error}")]
    NoExecutionProvider { path: String, last_error: String },
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("image decode failed: {0}")]
    Decode(#[from] image::ImageError),
    #[error("recognizer session lock poisoned")]
    Poisoned,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

static SHARED: Mutex<Option<Arc<FaceEmbedder>>> = Mutex::new(None);

/// ArcFace embedder: one ONNX session plus a pool of input tensors.
pub struct FaceEmbedder {
    session: Mutex<Session>,
    pool: TensorPool,
    output_index: usize,
    provider: &'static str,
}

impl std::fmt::Debug for FaceEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaceEmbedder")
            .field("provider", &self.provider)
            .field("output_index", &self.output_index)
            .finish_non_exhaustive()
    }
}

impl FaceEmbedder {
    /// Process-wide embedder, created on first call. Later calls return the
    /// same instance regardless of `model_path`.
    pub fn shared(model_path: &str) -> Result<Arc<FaceEmbedder>, RecognizerError> {
        let mut slot = SHARED.lock().map_err(|_| RecognizerError::Poisoned)?;
        if let Some(embedder) = slot.as_ref() {
            return Ok(Arc::clone(embedder));
        }
        let embedder = Arc::new(Self::load(model_path, None)?);
        *slot = Some(Arc::clone(&embedder));
        Ok(embedder)
    }

    /// Load the model, falling back through execution providers, then warm
    /// up. `output_name` selects the embedding output; the first output is
    /// used when `None` or not found.
    pub fn load(model_path: &str, output_name: Option<&str>) -> Result<Self, RecognizerError> {
        if !Path::new(model_path).exists() {
            return Err(RecognizerError::ModelNotFound(model_path.to_string()));
        }

        let mut last_error = String::from("no providers attempted");
        let mut loaded = None;
        for (provider, ep) in provider_candidates() {
            match build_session(model_path, ep) {
                Ok(session) => {
                    loaded = Some((provider, session));
                    break;
                }
                Err(e) => {
                    tracing::warn!(provider, error = %e, "execution provider unavailable, falling back");
                    last_error = e.to_string();
                }
            }
        }

        let Some((provider, session)) = loaded else {
            return Err(RecognizerError::NoExecutionProvider {
                path: model_path.to_string(),
                last_error,
            });
        };

        let output_names: Vec<String> = session
            .outputs()
            .iter()
            .map(|o| o.name().to_string())
            .collect();
        let output_index = output_name
            .and_then(|wanted| output_names.iter().position(|n| n == wanted))
            .unwrap_or(0);

        tracing::info!(
            path = model_path,
            provider,
            inputs = ?session.inputs().iter().map(|i| i.name()).collect::<Vec<_>>(),
            outputs = ?output_names,
            output_index,
            "loaded ArcFace model"
        );

        let embedder = Self {
            session: Mutex::new(session),
            pool: TensorPool::new((1, 3, INPUT_SIZE as usize, INPUT_SIZE as usize)),
            output_index,
            provider,
        };
        embedder.warm_up()?;
        Ok(embedder)
    }

    /// Name of the execution provider the session was created with.
    pub fn provider(&self) -> &'static str {
        self.provider
    }

    /// Decode the image at `path` and extract its embedding.
    pub fn extract_from_path(&self, path: &Path) -> Result<Embedding, RecognizerError> {
        let image = image::open(path)?;
        self.extract(&image)
    }

    /// Center-crop, resize and normalize `image`, then run one forward pass.
    pub fn extract(&self, image: &DynamicImage) -> Result<Embedding, RecognizerError> {
        let face = preprocess::crop_and_resize(image, INPUT_SIZE);
        let mut lease = self.pool.acquire();
        preprocess::write_planar(&face, &mut lease);
        let values = self.run(&lease)?;

        Ok(Embedding {
            values,
            model_version: Some(ARCFACE_MODEL_VERSION.to_string()),
        })
    }

    fn warm_up(&self) -> Result<(), RecognizerError> {
        let started = Instant::now();
        let mut lease = self.pool.acquire();
        lease.fill(0.0);
        self.run(&lease)?;
        tracing::info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "recognizer warm-up complete"
        );
        Ok(())
    }

    fn run(&self, input: &Array4<f32>) -> Result<Vec<f32>, RecognizerError> {
        let mut session = self.session.lock().map_err(|_| RecognizerError::Poisoned)?;
        let outputs = session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw_data) = outputs[self.output_index]
            .try_extract_tensor::<f32>()
            .map_err(|e| RecognizerError::InferenceFailed(format!("embedding extraction: {e}")))?;

        if raw_data.len() != EMBEDDING_DIM {
            return Err(RecognizerError::InferenceFailed(format!(
                "expected {EMBEDDING_DIM}-dim embedding, got {}",
                raw_data.len()
            )));
        }
        if raw_data.iter().any(|v| !v.is_finite()) {
            return Err(RecognizerError::InferenceFailed(
                "embedding contains NaN/Inf".to_string(),
            ));
        }

        Ok(raw_data.to_vec())
    }
}

/// Execution providers in preference order: platform accelerator, then the
/// vectorized CPU kernel library, then the plain CPU provider.
fn provider_candidates() -> Vec<(&'static str, ExecutionProviderDispatch)> {
    let mut candidates = Vec::with_capacity(3);
    if cfg!(target_vendor = "apple") {
        candidates.push((
            "CoreML",
            CoreMLExecutionProvider::default().build().error_on_failure(),
        ));
    } else {
        candidates.push((
            "CUDA",
            CUDAExecutionProvider::default().build().error_on_failure(),
        ));
    }
    candidates.push((
        "XNNPACK",
        XNNPACKExecutionProvider::default().build().error_on_failure(),
    ));
    candidates.push(("CPU", CPUExecutionProvider::default().build()));
    candidates
}

fn build_session(model_path: &str, ep: ExecutionProviderDispatch) -> Result<Session, RecognizerError> {
    let session = Session::builder()?
        .with_intra_threads(INTRA_THREADS)?
        .with_execution_providers([ep])?
        .commit_from_file(model_path)?;
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model_is_reported() {
        let err = FaceEmbedder::load("/nonexistent/w600k_r50.onnx", None).unwrap_err();
        assert!(matches!(err, RecognizerError::ModelNotFound(_)));
    }

    #[test]
    fn test_provider_order_ends_with_cpu() {
        let names: Vec<&str> = provider_candidates().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names.len(), 3);
        assert_eq!(names[1], "XNNPACK");
        assert_eq!(names.last(), Some(&"CPU"));
    }

    #[test]
    fn test_missing_model_does_not_poison_shared_slot() {
        assert!(FaceEmbedder::shared("/nonexistent/model.onnx").is_err());
        // A failed load leaves the slot empty for a later, valid path.
        assert!(SHARED.lock().unwrap().is_none());
    }
}

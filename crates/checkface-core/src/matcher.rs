//! Cosine identity matching against an in-memory gallery.

use crate::types::{Embedding, SavedFace};
use serde::Serialize;

/// Default acceptance threshold on cosine similarity.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.40;

/// Divide every component by the Euclidean norm. A zero vector is returned
/// unchanged (norm treated as 1).
pub fn l2_normalize(values: &[f32]) -> Vec<f32> {
    let norm = values.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm = if norm > 0.0 { norm } else { 1.0 };
    values.iter().map(|x| x / norm).collect()
}

/// Dot product of two pre-normalized vectors. Extra trailing components of
/// the longer vector are ignored.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Outcome of comparing a probe against a gallery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub matched: bool,
    /// Best similarity seen, reported even when not matched.
    pub similarity: f32,
    pub face_id: Option<String>,
    pub display_name: Option<String>,
}

impl MatchResult {
    pub fn no_match(similarity: f32) -> Self {
        Self {
            matched: false,
            similarity,
            face_id: None,
            display_name: None,
        }
    }
}

pub trait Matcher {
    fn compare(&self, probe: &Embedding, gallery: &[SavedFace], threshold: f32) -> MatchResult;
}

/// Max-cosine matcher: the probe is normalized, gallery entries are assumed
/// normalized at enrollment.
#[derive(Debug, Clone, Copy, Default)]
pub struct CosineMatcher;

impl Matcher for CosineMatcher {
    fn compare(&self, probe: &Embedding, gallery: &[SavedFace], threshold: f32) -> MatchResult {
        let probe = l2_normalize(&probe.values);

        let best = gallery
            .iter()
            .map(|face| (face, cosine_similarity(&probe, &face.embedding.values)))
            .max_by(|a, b| a.1.total_cmp(&b.1));

        match best {
            Some((face, similarity)) if similarity >= threshold => MatchResult {
                matched: true,
                similarity,
                face_id: Some(face.id.clone()),
                display_name: Some(face.display_name.clone()),
            },
            Some((_, similarity)) => MatchResult::no_match(similarity),
            None => MatchResult::no_match(0.0),
        }
    }
}

/// In-memory gallery of enrolled faces. Lives for one session only.
#[derive(Debug, Clone, Default)]
pub struct Gallery {
    faces: Vec<SavedFace>,
}

impl Gallery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a normalized copy of `embedding` under a fresh id.
    pub fn enroll(&mut self, display_name: &str, embedding: &Embedding) -> SavedFace {
        let face = SavedFace {
            id: uuid::Uuid::new_v4().to_string(),
            display_name: display_name.to_string(),
            embedding: Embedding {
                values: l2_normalize(&embedding.values),
                model_version: embedding.model_version.clone(),
            },
        };
        tracing::info!(id = %face.id, name = display_name, "face enrolled");
        self.faces.push(face.clone());
        face
    }

    pub fn recognize(&self, probe: &Embedding, threshold: f32) -> MatchResult {
        let result = CosineMatcher.compare(probe, &self.faces, threshold);
        tracing::debug!(
            matched = result.matched,
            similarity = result.similarity,
            gallery = self.faces.len(),
            "recognize"
        );
        result
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.faces.len();
        self.faces.retain(|f| f.id != id);
        self.faces.len() != before
    }

    pub fn faces(&self) -> &[SavedFace] {
        &self.faces
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }
}

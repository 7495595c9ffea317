//! checkface-core: face liveness and identity engine.
//!
//! Geometric liveness analysis over per-frame landmark detections, temporal
//! voting and blink tracking, guide-fit classification, ArcFace embedding
//! extraction via ONNX Runtime, and cosine identity matching.

pub mod blink;
pub mod feed;
pub mod geometry;
pub mod guide;
pub mod liveness;
pub mod matcher;
pub mod pool;
pub mod preprocess;
pub mod recognizer;
pub mod types;
pub mod voting;

pub use blink::BlinkDetector;
pub use feed::{FaceDetection, FrameRecord};
pub use guide::{FitState, GuideEllipse, StabilityCounter};
pub use liveness::{FrameSignals, GeometricAnalyzer, LivenessThresholds};
pub use matcher::{cosine_similarity, l2_normalize, CosineMatcher, Gallery, MatchResult, Matcher};
pub use recognizer::{FaceEmbedder, RecognizerError};
pub use types::{BoundingBox, Embedding, Point, SavedFace};
pub use voting::{Verdict, VoteBuffer};

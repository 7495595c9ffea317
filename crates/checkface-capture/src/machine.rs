//! Gated capture state machine.
//!
//! Fed with every [`FrameState`]; when the face has been stable in the guide,
//! liveness does not say spoof, a blink was seen recently and no other cycle
//! holds the lease, it triggers exactly one capture cycle per stable streak.
//! The cycle runs as its own task so frame analysis keeps flowing.

use checkface_core::guide::FitState;
use checkface_core::voting::Verdict;
use checkface_core::{Gallery, MatchResult, SavedFace};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;

use crate::camera::PhotoCapture;
use crate::engine::EmbeddingSource;
use crate::failure::CaptureFailure;
use crate::lease::{CaptureLease, LeaseGuard};
use crate::session::FrameState;

/// What a triggered capture is for. Set by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CaptureMode {
    #[default]
    Idle,
    Enroll {
        name: String,
    },
    Recognize,
}

/// Progress within the current stable streak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttemptState {
    #[default]
    NotAttempted,
    Stable,
    Captured,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    Enrolled(SavedFace),
    Recognized(MatchResult),
    NoMatch(MatchResult),
    Failed(CaptureFailure),
}

/// Handle to a running capture cycle.
#[derive(Debug)]
pub struct CaptureCycle {
    task: JoinHandle<CaptureOutcome>,
}

impl CaptureCycle {
    /// Wait for the cycle. A panicked cycle is reported as `capture_failed`.
    pub async fn outcome(self) -> CaptureOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, "capture cycle aborted");
                CaptureOutcome::Failed(CaptureFailure::CaptureFailed)
            }
        }
    }
}

pub struct CaptureMachine {
    mode: CaptureMode,
    attempt: AttemptState,
    lease: CaptureLease,
    camera: Arc<dyn PhotoCapture>,
    extractor: Arc<dyn EmbeddingSource>,
    gallery: Arc<Mutex<Gallery>>,
    threshold: f32,
}

impl CaptureMachine {
    pub fn new(
        camera: Arc<dyn PhotoCapture>,
        extractor: Arc<dyn EmbeddingSource>,
        lease: CaptureLease,
        threshold: f32,
    ) -> Self {
        Self {
            mode: CaptureMode::Idle,
            attempt: AttemptState::NotAttempted,
            lease,
            camera,
            extractor,
            gallery: Arc::new(Mutex::new(Gallery::new())),
            threshold,
        }
    }

    pub fn mode(&self) -> &CaptureMode {
        &self.mode
    }

    /// Switch mode. The current streak must restabilize before the next
    /// capture.
    pub fn set_mode(&mut self, mode: CaptureMode) {
        tracing::info!(?mode, "capture mode changed");
        self.mode = mode;
        self.attempt = AttemptState::NotAttempted;
    }

    pub fn attempt(&self) -> AttemptState {
        self.attempt
    }

    pub fn lease(&self) -> &CaptureLease {
        &self.lease
    }

    pub fn gallery(&self) -> Arc<Mutex<Gallery>> {
        Arc::clone(&self.gallery)
    }

    /// Fold one frame. Returns the spawned cycle when this frame triggered a
    /// capture. Must be called inside a tokio runtime.
    pub fn on_frame(&mut self, state: &FrameState) -> Option<CaptureCycle> {
        if !state.stable || state.fit != FitState::Ok {
            self.attempt = AttemptState::NotAttempted;
            return None;
        }
        match self.attempt {
            AttemptState::Captured => return None,
            AttemptState::NotAttempted => self.attempt = AttemptState::Stable,
            AttemptState::Stable => {}
        }

        let kind = match &self.mode {
            CaptureMode::Idle => return None,
            CaptureMode::Enroll { name } => CycleKind::Enroll(name.clone()),
            CaptureMode::Recognize => CycleKind::Recognize,
        };
        if state.verdict == Verdict::LikelyPaperOrScreen || !state.recent_blink {
            return None;
        }

        let guard = self.lease.try_acquire()?;
        self.attempt = AttemptState::Captured;
        tracing::info!(ts = state.timestamp_ms, verdict = state.verdict.as_str(), "capture triggered");

        let task = tokio::spawn(run_cycle(
            guard,
            kind,
            Arc::clone(&self.camera),
            Arc::clone(&self.extractor),
            Arc::clone(&self.gallery),
            self.threshold,
        ));
        Some(CaptureCycle { task })
    }
}

#[derive(Debug, Clone)]
enum CycleKind {
    Enroll(String),
    Recognize,
}

// A panicking holder must not wedge the gallery.
fn lock_gallery(gallery: &Mutex<Gallery>) -> MutexGuard<'_, Gallery> {
    gallery.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn run_cycle(
    guard: LeaseGuard,
    kind: CycleKind,
    camera: Arc<dyn PhotoCapture>,
    extractor: Arc<dyn EmbeddingSource>,
    gallery: Arc<Mutex<Gallery>>,
    threshold: f32,
) -> CaptureOutcome {
    let photo = match camera.take_photo().await {
        Ok(photo) => photo,
        Err(e) => {
            tracing::warn!(error = %e, "photo capture failed");
            return CaptureOutcome::Failed(CaptureFailure::CaptureFailed);
        }
    };

    guard.set_processing();
    // Let pending frame callbacks run before the inference burst.
    tokio::task::yield_now().await;

    let embedding = match extractor.extract(&photo).await {
        Ok(embedding) => embedding,
        Err(e) => {
            tracing::warn!(photo = %photo.display(), error = %e, "embedding extraction failed");
            return CaptureOutcome::Failed(CaptureFailure::FaceidError);
        }
    };

    let outcome = match kind {
        CycleKind::Enroll(name) => CaptureOutcome::Enrolled(lock_gallery(&gallery).enroll(&name, &embedding)),
        CycleKind::Recognize => {
            let result = lock_gallery(&gallery).recognize(&embedding, threshold);
            if result.matched {
                CaptureOutcome::Recognized(result)
            } else {
                CaptureOutcome::NoMatch(result)
            }
        }
    };

    drop(guard);
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::CollaboratorError;
    use crate::engine::EngineError;
    use crate::lease::LeaseState;
    use async_trait::async_trait;
    use checkface_core::Embedding;
    use std::path::{Path, PathBuf};
    use std::time::Duration;
    use tokio::sync::Notify;

    fn basis(i: usize) -> Vec<f32> {
        let mut v = vec![0.0; 512];
        v[i] = 1.0;
        v
    }

    /// Returns the embedding named by the photo file stem ("face-<i>").
    struct StubCamera {
        next: Mutex<usize>,
    }

    impl StubCamera {
        fn showing(i: usize) -> Arc<Self> {
            Arc::new(Self {
                next: Mutex::new(i),
            })
        }

        fn show(&self, i: usize) {
            *self.next.lock().unwrap() = i;
        }
    }

    #[async_trait]
    impl PhotoCapture for StubCamera {
        async fn take_photo(&self) -> Result<PathBuf, CollaboratorError> {
            Ok(PathBuf::from(format!("/tmp/face-{}.jpg", self.next.lock().unwrap())))
        }
    }

    struct StubExtractor;

    #[async_trait]
    impl EmbeddingSource for StubExtractor {
        async fn extract(&self, photo: &Path) -> Result<Embedding, EngineError> {
            let stem = photo.file_stem().and_then(|s| s.to_str()).unwrap_or("");
            let i: usize = stem.trim_start_matches("face-").parse().unwrap();
            Ok(Embedding::new(basis(i)))
        }
    }

    /// Blocks every extraction until notified.
    struct HangingExtractor {
        release: Arc<Notify>,
    }

    #[async_trait]
    impl EmbeddingSource for HangingExtractor {
        async fn extract(&self, _photo: &Path) -> Result<Embedding, EngineError> {
            self.release.notified().await;
            Err(EngineError::ChannelClosed)
        }
    }

    struct PanickingExtractor;

    #[async_trait]
    impl EmbeddingSource for PanickingExtractor {
        async fn extract(&self, _photo: &Path) -> Result<Embedding, EngineError> {
            panic!("model crashed");
        }
    }

    fn ready() -> FrameState {
        FrameState {
            face_present: true,
            fit: FitState::Ok,
            stable_count: 6,
            stable: true,
            verdict: Verdict::LikelyReal,
            recent_blink: true,
            ..FrameState::default()
        }
    }

    fn machine(camera: Arc<StubCamera>, extractor: Arc<dyn EmbeddingSource>) -> CaptureMachine {
        CaptureMachine::new(
            camera,
            extractor,
            CaptureLease::new(Duration::from_millis(1200)),
            0.40,
        )
    }

    #[tokio::test]
    async fn enroll_then_recognize() {
        let camera = StubCamera::showing(0);
        let mut m = machine(camera.clone(), Arc::new(StubExtractor));

        m.set_mode(CaptureMode::Enroll { name: "A".into() });
        let face_a = match m.on_frame(&ready()).unwrap().outcome().await {
            CaptureOutcome::Enrolled(face) => face,
            other => panic!("expected enrollment, got {other:?}"),
        };
        assert_eq!(face_a.display_name, "A");
        assert!(m.lease().is_idle());

        camera.show(2);
        m.set_mode(CaptureMode::Enroll { name: "B".into() });
        m.on_frame(&ready()).unwrap().outcome().await;
        assert_eq!(m.gallery().lock().unwrap().len(), 2);

        camera.show(0);
        m.set_mode(CaptureMode::Recognize);
        match m.on_frame(&ready()).unwrap().outcome().await {
            CaptureOutcome::Recognized(result) => {
                assert_eq!(result.face_id, Some(face_a.id.clone()));
                assert!(result.similarity >= 0.99);
            }
            other => panic!("expected match, got {other:?}"),
        }

        camera.show(7);
        m.set_mode(CaptureMode::Recognize);
        match m.on_frame(&ready()).unwrap().outcome().await {
            CaptureOutcome::NoMatch(result) => assert!(result.face_id.is_none()),
            other => panic!("expected no match, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn one_capture_per_stable_streak() {
        let mut m = machine(StubCamera::showing(0), Arc::new(StubExtractor));
        m.set_mode(CaptureMode::Recognize);

        let cycle = m.on_frame(&ready()).unwrap();
        assert_eq!(m.attempt(), AttemptState::Captured);
        cycle.outcome().await;

        assert!(m.on_frame(&ready()).is_none());

        // Breaking the streak re-arms the trigger.
        let broken = FrameState {
            stable: false,
            stable_count: 0,
            ..ready()
        };
        assert!(m.on_frame(&broken).is_none());
        assert_eq!(m.attempt(), AttemptState::NotAttempted);
        assert!(m.on_frame(&ready()).is_some());
    }

    #[tokio::test]
    async fn gates_block_trigger() {
        let mut m = machine(StubCamera::showing(0), Arc::new(StubExtractor));

        // Idle mode: stable but no capture.
        assert!(m.on_frame(&ready()).is_none());
        assert_eq!(m.attempt(), AttemptState::Stable);

        m.set_mode(CaptureMode::Recognize);
        let spoof = FrameState {
            verdict: Verdict::LikelyPaperOrScreen,
            ..ready()
        };
        assert!(m.on_frame(&spoof).is_none());

        let no_blink = FrameState {
            recent_blink: false,
            ..ready()
        };
        assert!(m.on_frame(&no_blink).is_none());

        // Unknown verdict does not block.
        let unknown = FrameState {
            verdict: Verdict::Unknown,
            ..ready()
        };
        assert!(m.on_frame(&unknown).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn hung_cycle_releases_lease_after_timeout() {
        let release = Arc::new(Notify::new());
        let mut m = machine(
            StubCamera::showing(0),
            Arc::new(HangingExtractor {
                release: release.clone(),
            }),
        );
        m.set_mode(CaptureMode::Recognize);
        let cycle = m.on_frame(&ready()).unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(m.lease().state(), LeaseState::Processing);

        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert!(m.lease().is_idle());

        release.notify_one();
        assert_eq!(
            cycle.outcome().await,
            CaptureOutcome::Failed(CaptureFailure::FaceidError)
        );
        assert!(m.lease().is_idle());
    }

    #[tokio::test]
    async fn panicking_cycle_releases_lease() {
        let mut m = machine(StubCamera::showing(0), Arc::new(PanickingExtractor));
        m.set_mode(CaptureMode::Recognize);

        let outcome = m.on_frame(&ready()).unwrap().outcome().await;
        assert_eq!(outcome, CaptureOutcome::Failed(CaptureFailure::CaptureFailed));
        assert!(m.lease().is_idle());
    }

    #[tokio::test]
    async fn busy_lease_blocks_second_trigger() {
        let mut m = machine(StubCamera::showing(0), Arc::new(StubExtractor));
        m.set_mode(CaptureMode::Recognize);

        let held = m.lease().try_acquire().unwrap();
        assert!(m.on_frame(&ready()).is_none());
        assert_eq!(m.attempt(), AttemptState::Stable);

        drop(held);
        assert!(m.on_frame(&ready()).is_some());
    }
}

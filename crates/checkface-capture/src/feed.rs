use checkface_core::FaceDetection;
use tokio::sync::watch;

use crate::session::{FrameState, LivenessSession};

/// Frame-source side of the pipeline.
///
/// `on_frame` runs synchronously on the detector callback and never blocks.
/// Each snapshot replaces the previous one in a single-slot watch channel, so
/// slow consumers only ever see the latest frame.
#[derive(Debug)]
pub struct AnalyzerFeed {
    session: LivenessSession,
    tx: watch::Sender<Option<FrameState>>,
}

impl AnalyzerFeed {
    pub fn new(session: LivenessSession) -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { session, tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<FrameState>> {
        self.tx.subscribe()
    }

    pub fn on_frame(&mut self, detection: Option<&FaceDetection>, now_ms: u64) -> FrameState {
        let state = self.session.process(detection, now_ms);
        self.tx.send_replace(Some(state.clone()));
        state
    }

    pub fn session_mut(&mut self) -> &mut LivenessSession {
        &mut self.session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::{centered_face, guide};
    use checkface_core::LivenessThresholds;

    #[test]
    fn test_latest_value_wins() {
        let mut feed = AnalyzerFeed::new(LivenessSession::new(guide(), LivenessThresholds::default(), 6));
        let mut rx = feed.subscribe();
        assert!(rx.borrow().is_none());

        for i in 0..5 {
            feed.on_frame(Some(&centered_face(i * 33, 0.9)), i * 33);
        }

        assert!(rx.has_changed().unwrap());
        let latest = rx.borrow_and_update().clone().unwrap();
        assert_eq!(latest.timestamp_ms, 4 * 33);
        assert_eq!(latest.stable_count, 5);
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_publishes_without_subscribers() {
        let mut feed = AnalyzerFeed::new(LivenessSession::new(guide(), LivenessThresholds::default(), 6));
        let state = feed.on_frame(None, 10);
        assert!(!state.face_present);
        assert_eq!(feed.subscribe().borrow().as_ref().map(|s| s.timestamp_ms), Some(10));
    }
}

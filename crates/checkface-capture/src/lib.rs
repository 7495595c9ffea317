//! checkface-capture: capture orchestration on top of `checkface-core`.
//!
//! Frame states flow from [`AnalyzerFeed`] through a single-slot watch
//! channel to the [`CaptureMachine`] and the guided [`steps`]. Inference runs
//! on a dedicated engine thread; the [`CaptureLease`] keeps at most one
//! capture cycle in flight.

pub mod attendance;
pub mod camera;
pub mod config;
pub mod engine;
pub mod failure;
pub mod feed;
pub mod lease;
pub mod machine;
pub mod session;
pub mod steps;

pub use attendance::{
    AttendanceSink, AttendanceSubmission, CheckInError, CheckInFlow, CheckInReceipt, CheckType,
    CollaboratorError, HttpAttendanceSink, HttpUploader, ImageUploader,
};
pub use camera::{PhotoCapture, StillImageCamera};
pub use config::Config;
pub use engine::{spawn_engine, EmbeddingSource, EngineError, EngineHandle};
pub use failure::CaptureFailure;
pub use feed::AnalyzerFeed;
pub use lease::{CaptureLease, LeaseGuard, LeaseState};
pub use machine::{AttemptState, CaptureCycle, CaptureMachine, CaptureMode, CaptureOutcome};
pub use session::{FrameState, LivenessSession};
pub use steps::{capture_step, wait_for_step, Step, StepPolicy};

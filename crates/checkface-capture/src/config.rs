use checkface_core::GuideEllipse;
use std::path::PathBuf;
use std::time::Duration;

use crate::steps::StepPolicy;

/// Capture configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Writable cache directory holding the verified model.
    pub model_dir: PathBuf,
    /// Read-only directory the model ships in.
    pub bundled_model_dir: PathBuf,
    /// Cosine similarity threshold for a positive match.
    pub similarity_threshold: f32,
    /// Consecutive `ok` guide-fit frames before capture is permitted.
    pub stable_frames: u32,
    /// Forced return of the capture lease to idle.
    pub lease_timeout_ms: u64,
    /// How long a step condition must hold continuously.
    pub step_hold_ms: u64,
    pub step_timeout_ms: u64,
    pub step_poll_ms: u64,
    /// Maximum |yaw| and |roll| (degrees) for a frontal face.
    pub front_tolerance_deg: f32,
    pub smile_threshold: f32,
    /// Image-upload endpoint. Check-in is unavailable when unset.
    pub upload_url: Option<String>,
    /// Attendance-submission endpoint. Check-in is unavailable when unset.
    pub submit_url: Option<String>,
    /// Preview surface size used to lay out the guide ellipse.
    pub screen_width: f32,
    pub screen_height: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model_dir: default_cache_dir(),
            bundled_model_dir: PathBuf::from("/usr/share/checkface/models"),
            similarity_threshold: checkface_core::matcher::DEFAULT_SIMILARITY_THRESHOLD,
            stable_frames: checkface_core::guide::DEFAULT_STABLE_FRAMES,
            lease_timeout_ms: 1200,
            step_hold_ms: 350,
            step_timeout_ms: 8000,
            step_poll_ms: 50,
            front_tolerance_deg: 12.0,
            smile_threshold: 0.6,
            upload_url: None,
            submit_url: None,
            screen_width: 720.0,
            screen_height: 1280.0,
        }
    }
}

impl Config {
    /// Load configuration from `CHECKFACE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            model_dir: std::env::var("CHECKFACE_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_dir),
            bundled_model_dir: std::env::var("CHECKFACE_BUNDLED_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.bundled_model_dir),
            similarity_threshold: env_f32(
                "CHECKFACE_SIMILARITY_THRESHOLD",
                defaults.similarity_threshold,
            ),
            stable_frames: env_u32("CHECKFACE_STABLE_FRAMES", defaults.stable_frames),
            lease_timeout_ms: env_u64("CHECKFACE_LEASE_TIMEOUT_MS", defaults.lease_timeout_ms),
            step_hold_ms: env_u64("CHECKFACE_STEP_HOLD_MS", defaults.step_hold_ms),
            step_timeout_ms: env_u64("CHECKFACE_STEP_TIMEOUT_MS", defaults.step_timeout_ms),
            step_poll_ms: env_u64("CHECKFACE_STEP_POLL_MS", defaults.step_poll_ms),
            front_tolerance_deg: env_f32(
                "CHECKFACE_FRONT_TOLERANCE_DEG",
                defaults.front_tolerance_deg,
            ),
            smile_threshold: env_f32("CHECKFACE_SMILE_THRESHOLD", defaults.smile_threshold),
            upload_url: std::env::var("CHECKFACE_UPLOAD_URL").ok(),
            submit_url: std::env::var("CHECKFACE_SUBMIT_URL").ok(),
            screen_width: env_f32("CHECKFACE_SCREEN_WIDTH", defaults.screen_width),
            screen_height: env_f32("CHECKFACE_SCREEN_HEIGHT", defaults.screen_height),
        }
    }

    /// Path to the cached ArcFace recognition model.
    pub fn arcface_model_path(&self) -> String {
        self.model_dir
            .join(checkface_models::ARCFACE.name)
            .to_string_lossy()
            .into_owned()
    }

    pub fn guide(&self) -> GuideEllipse {
        GuideEllipse::for_screen(self.screen_width, self.screen_height)
    }

    pub fn lease_timeout(&self) -> Duration {
        Duration::from_millis(self.lease_timeout_ms)
    }

    pub fn step_policy(&self) -> StepPolicy {
        StepPolicy {
            hold: Duration::from_millis(self.step_hold_ms),
            timeout: Duration::from_millis(self.step_timeout_ms),
            poll: Duration::from_millis(self.step_poll_ms.max(1)),
            front_tolerance_deg: self.front_tolerance_deg,
            smile_threshold: self.smile_threshold,
        }
    }
}

/// `$XDG_CACHE_HOME/checkface/models`, falling back to `~/.cache`.
fn default_cache_dir() -> PathBuf {
    std::env::var("XDG_CACHE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".cache")
        })
        .join("checkface")
        .join("models")
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

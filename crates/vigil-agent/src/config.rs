use std::path::PathBuf;

use vigil_core::MatchPolicy;

/// Agent configuration, loaded from environment variables.
pub struct Config {
    /// Base URL of the coordinator daemon.
    pub coordinator_url: String,
    /// Directory of frame files standing in for a live camera.
    pub frame_dir: PathBuf,
    /// Path to the SQLite database file (shared with the coordinator).
    pub db_path: PathBuf,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// SSIM score below which a frame counts as changed.
    pub change_threshold: f32,
    /// Number of frames averaged into a fresh background reference.
    pub baseline_frames: usize,
    /// Capture a fresh background at startup instead of reusing a stored one.
    pub refresh_baseline: bool,
    /// Delay between capture ticks, in milliseconds.
    pub tick_delay_ms: u64,
    /// Identity matching policy (`best` or `any`).
    pub match_policy: MatchPolicy,
    /// Optional override for the match threshold; the encoder's own
    /// threshold applies when unset.
    pub match_threshold: Option<f32>,
}

impl Config {
    /// Load configuration from `VIGIL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("vigil");

        let db_path = std::env::var("VIGIL_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("vigil.db"));

        let model_dir = std::env::var("VIGIL_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("models"));

        Self {
            coordinator_url: std::env::var("VIGIL_COORDINATOR_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            frame_dir: std::env::var("VIGIL_FRAME_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("frames")),
            db_path,
            model_dir,
            change_threshold: env_f32("VIGIL_CHANGE_THRESHOLD", 0.85),
            baseline_frames: env_usize("VIGIL_BASELINE_FRAMES", 5),
            refresh_baseline: std::env::var("VIGIL_REFRESH_BASELINE")
                .map(|v| v != "0")
                .unwrap_or(true),
            tick_delay_ms: env_u64("VIGIL_TICK_DELAY_MS", 100),
            match_policy: std::env::var("VIGIL_MATCH_POLICY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(MatchPolicy::Best),
            match_threshold: std::env::var("VIGIL_MATCH_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok()),
        }
    }

    /// Path to the face detection model.
    pub fn detector_model_path(&self) -> PathBuf {
        self.model_dir.join("yolov8n-face.onnx")
    }

    /// Path to the face recognition model.
    pub fn recognizer_model_path(&self) -> PathBuf {
        self.model_dir.join("w600k_r50.onnx")
    }
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

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

use std::path::PathBuf;

/// Coordinator configuration, loaded from environment variables.
pub struct Config {
    /// Socket address to bind the HTTP server on.
    pub bind_addr: String,
    /// Path to the SQLite database file (shared with the agent).
    pub db_path: PathBuf,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
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
            bind_addr: std::env::var("VIGILD_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            db_path,
            model_dir,
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

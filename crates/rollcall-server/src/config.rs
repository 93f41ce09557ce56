use rollcall_facedb::FaceDbConfig;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Server configuration, loaded from environment variables.
pub struct Config {
    /// Address the HTTP listener binds to (default 0.0.0.0:5000).
    pub bind: SocketAddr,
    /// Frontend origin allowed by CORS.
    pub allowed_origin: String,
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// SQLite database holding enrolled faces.
    pub db_path: PathBuf,
    /// Where each uploaded image is written before decoding. Overwritten per request.
    pub upload_path: PathBuf,
    /// Cosine similarity needed for a match.
    pub similarity_threshold: f32,
    /// Largest accepted request body.
    pub max_upload_bytes: usize,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self {
            bind: env_parse("ROLLCALL_BIND", SocketAddr::from(([0, 0, 0, 0], 5000))),
            allowed_origin: std::env::var("ROLLCALL_ALLOWED_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            model_dir: std::env::var("ROLLCALL_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| rollcall_facedb::default_model_dir()),
            db_path: std::env::var("ROLLCALL_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("facedata/faces.db")),
            upload_path: std::env::var("ROLLCALL_UPLOAD_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("captured_face.jpg")),
            similarity_threshold: env_parse(
                "ROLLCALL_SIMILARITY_THRESHOLD",
                rollcall_facedb::DEFAULT_SIMILARITY_THRESHOLD,
            ),
            max_upload_bytes: env_parse("ROLLCALL_MAX_UPLOAD_BYTES", 16 * 1024 * 1024),
        }
    }

    pub fn facedb(&self) -> FaceDbConfig {
        FaceDbConfig {
            model_dir: self.model_dir.clone(),
            db_path: self.db_path.clone(),
            similarity_threshold: self.similarity_threshold,
        }
    }
}

/// Parse `key`, falling back to `default` when unset or malformed.
fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "ignoring unparsable setting");
            default
        }),
        Err(_) => default,
    }
}

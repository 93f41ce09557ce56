//! rollcall-facedb: face database for attendance.
//!
//! Detects faces with SCRFD, embeds them with ArcFace (both via ONNX
//! Runtime) and matches embeddings against identities stored in SQLite.

pub mod alignment;
pub mod detector;
pub mod encoder;
pub mod facedb;
pub mod identity;
pub mod recognizer;
pub mod store;
pub mod types;

pub use encoder::{EncoderError, FaceEncoder, OnnxEncoder};
pub use facedb::{
    default_model_dir, load_image, FaceDb, FaceDbConfig, FaceDbError, DEFAULT_SIMILARITY_THRESHOLD,
};
pub use identity::{FaceId, FaceIdError};
pub use store::{FaceStore, StoreError};
pub use types::{CosineMatcher, Embedding, FaceRecord, FaceRegion, MatchResult, Matcher, Recognition};

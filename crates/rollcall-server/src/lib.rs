//! HTTP face enrollment and recognition for classroom attendance.
//!
//! Handlers parse multipart uploads and hand them to a single engine thread
//! that owns the face database.

pub mod config;
pub mod engine;
mod error;
mod routes;

pub use config::Config;
pub use engine::{spawn_engine, EngineError, EngineHandle, SaveOutcome};
pub use error::ApiError;
pub use routes::{app, AppState};

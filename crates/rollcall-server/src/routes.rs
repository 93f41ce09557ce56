use crate::config::Config;
use crate::engine::{EngineHandle, SaveOutcome};
use crate::error::ApiError;
use axum::extract::multipart::{Multipart, MultipartError, MultipartRejection};
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::{Json, Router};
use rollcall_facedb::FaceId;
use serde_json::{json, Value};
use std::collections::HashMap;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// State shared across HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: EngineHandle,
}

/// Build the router with CORS limited to the configured frontend origin.
pub fn app(state: AppState, config: &Config) -> anyhow::Result<Router> {
    let origin = HeaderValue::from_str(&config.allowed_origin)?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Ok(Router::new()
        .route("/save-face", post(save_face))
        .route("/recognize-face", post(recognize_face))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

/// A multipart body split into uploaded files and plain text fields.
#[derive(Default)]
struct Upload {
    files: HashMap<String, Vec<u8>>,
    fields: HashMap<String, String>,
}

impl Upload {
    /// A part counts as a file only when it carries a non-empty filename.
    async fn read(mut multipart: Multipart) -> Result<Self, MultipartError> {
        let mut upload = Self::default();
        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_owned) else {
                continue;
            };
            if field.file_name().is_some_and(|f| !f.is_empty()) {
                upload.files.insert(name, field.bytes().await?.to_vec());
            } else {
                upload.fields.insert(name, field.text().await?);
            }
        }
        Ok(upload)
    }

    fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str).filter(|v| !v.is_empty())
    }
}

async fn save_face(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, ApiError> {
    let multipart = multipart.map_err(|_| ApiError::NoImage)?;
    let mut upload = Upload::read(multipart).await?;

    let image = upload.files.remove("image").ok_or(ApiError::NoImage)?;
    let (Some(name), Some(reg_no)) = (upload.field("name"), upload.field("reg_no")) else {
        return Err(ApiError::MissingFields);
    };
    let id = FaceId::new(reg_no, name)?;

    match state.engine.save_face(image, id.clone()).await {
        Ok(SaveOutcome::AlreadyKnown(existing)) => {
            tracing::info!(
                requested = %id,
                existing = %existing.id,
                confidence = existing.confidence,
                "save-face: face already enrolled"
            );
        }
        Ok(SaveOutcome::Added { id, confirmed }) => {
            tracing::info!(id = %id, confirmed, "save-face: face enrolled");
        }
        Err(e) => {
            tracing::error!(id = %id, error = %e, "save-face failed");
            return Err(ApiError::SaveFailed(e.to_string()));
        }
    }
    Ok(Json(json!({ "message": "Face saved successfully" })))
}

async fn recognize_face(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, ApiError> {
    let multipart = multipart.map_err(|_| ApiError::NoImage)?;
    let mut upload = Upload::read(multipart).await?;

    let frame = upload.files.remove("frame").ok_or(ApiError::NoImage)?;
    let classroom_id = upload.field("classroomId").unwrap_or_default().to_string();

    let recognition = state.engine.recognize_face(frame).await.map_err(|e| {
        tracing::error!(classroom_id = %classroom_id, error = %e, "recognize-face failed");
        ApiError::RecognizeFailed(e.to_string())
    })?;

    let Some(recognition) = recognition else {
        tracing::info!(classroom_id = %classroom_id, "recognize-face: no match");
        return Err(ApiError::NoFaces);
    };

    let id = FaceId::parse(&recognition.id)
        .map_err(|e| ApiError::RecognizeFailed(e.to_string()))?;
    tracing::info!(
        classroom_id = %classroom_id,
        id = %recognition.id,
        name = %id.name,
        confidence = recognition.confidence,
        "recognize-face: matched"
    );
    Ok(Json(json!({
        "message": "Face recognition completed.",
        "faces": [id.name, id.reg_no],
    })))
}

async fn health(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let faces = state
        .engine
        .count()
        .await
        .map_err(|e| ApiError::Unavailable(e.to_string()))?;
    Ok(Json(json!({
        "status": "ok",
        "faces": faces,
        "version": env!("CARGO_PKG_VERSION"),
    })))
}

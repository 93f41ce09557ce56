use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rollcall_facedb::FaceIdError;
use serde_json::json;

/// Every non-success answer the HTTP API gives, with its JSON envelope.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("No image file uploaded")]
    NoImage,
    #[error("Name or registration number is missing")]
    MissingFields,
    #[error("{0}")]
    InvalidId(#[from] FaceIdError),
    #[error("No faces detected in the image.")]
    NoFaces,
    #[error("malformed upload: {0}")]
    Multipart(#[from] MultipartError),
    #[error("Failed to save face data.")]
    SaveFailed(String),
    #[error("Failed to recognize face.")]
    RecognizeFailed(String),
    #[error("face database unavailable")]
    Unavailable(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::NoImage | ApiError::MissingFields | ApiError::InvalidId(_) => {
                (StatusCode::BAD_REQUEST, json!({ "error": self.to_string() }))
            }
            // Reported under "message", the same key a match uses.
            ApiError::NoFaces => (StatusCode::BAD_REQUEST, json!({ "message": self.to_string() })),
            ApiError::Multipart(e) => (e.status(), json!({ "error": e.body_text() })),
            ApiError::SaveFailed(details)
            | ApiError::RecognizeFailed(details)
            | ApiError::Unavailable(details) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": self.to_string(), "details": details }),
            ),
        };
        (status, Json(body)).into_response()
    }
}

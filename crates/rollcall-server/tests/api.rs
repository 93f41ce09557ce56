use axum::body::{self, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use image::{GrayImage, ImageFormat, Luma};
use rollcall_facedb::{EncoderError, Embedding, FaceDb, FaceEncoder, FaceRegion, FaceStore};
use rollcall_server::{app, spawn_engine, AppState, Config};
use serde_json::Value;
use std::io::Cursor;
use tower::ServiceExt;

const BOUNDARY: &str = "rollcall-test-boundary";

/// One face per image, embedded as the image's first pixel row.
/// An all-black image has no face.
struct RowEncoder;

impl FaceEncoder for RowEncoder {
    fn encode(&mut self, image: &GrayImage) -> Result<Vec<(FaceRegion, Embedding)>, EncoderError> {
        if image.pixels().all(|p| p[0] == 0) {
            return Ok(Vec::new());
        }
        let values = (0..image.width())
            .map(|x| image.get_pixel(x, 0)[0] as f32)
            .collect();
        let region = FaceRegion {
            x: 0.0,
            y: 0.0,
            width: image.width() as f32,
            height: image.height() as f32,
            confidence: 0.99,
            landmarks: None,
        };
        Ok(vec![(region, Embedding::new(values).normalized())])
    }
}

struct Harness {
    router: Router,
    _dir: tempfile::TempDir,
}

fn harness_with_limit(max_upload_bytes: usize) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        bind: "127.0.0.1:0".parse().unwrap(),
        allowed_origin: "http://localhost:3000".into(),
        model_dir: dir.path().join("models"),
        db_path: dir.path().join("faces.db"),
        upload_path: dir.path().join("captured_face.jpg"),
        similarity_threshold: 0.9,
        max_upload_bytes,
    };
    let db = FaceDb::new(RowEncoder, FaceStore::open(&config.db_path).unwrap(), 0.9);
    let engine = spawn_engine(db, config.upload_path.clone()).unwrap();
    let router = app(AppState { engine }, &config).unwrap();
    Harness { router, _dir: dir }
}

fn harness() -> Harness {
    harness_with_limit(16 * 1024 * 1024)
}

fn png(row: [u8; 3]) -> Vec<u8> {
    let img = GrayImage::from_fn(3, 2, |x, _| Luma([row[x as usize]]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

enum Part<'a> {
    File(&'a str, Vec<u8>),
    Text(&'a str, &'a str),
}

fn multipart(parts: Vec<Part<'_>>) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::File(name, bytes) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"face.jpg\"\r\n\
                         Content-Type: image/jpeg\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(&bytes);
            }
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}")
                        .as_bytes(),
                );
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

async fn post(router: &Router, path: &str, parts: Vec<Part<'_>>) -> (StatusCode, Value) {
    let request = Request::post(path)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart(parts)))
        .unwrap();
    send(router, request).await
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

async fn save(router: &Router, row: [u8; 3], name: &str, reg_no: &str) -> (StatusCode, Value) {
    post(
        router,
        "/save-face",
        vec![
            Part::File("image", png(row)),
            Part::Text("name", name),
            Part::Text("reg_no", reg_no),
        ],
    )
    .await
}

async fn recognize(router: &Router, row: [u8; 3]) -> (StatusCode, Value) {
    post(
        router,
        "/recognize-face",
        vec![Part::File("frame", png(row)), Part::Text("classroomId", "2")],
    )
    .await
}

async fn face_count(router: &Router) -> u64 {
    let request = Request::get("/health").body(Body::empty()).unwrap();
    let (status, body) = send(router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    body["faces"].as_u64().unwrap()
}

#[tokio::test]
async fn save_then_recognize() {
    let h = harness();

    let (status, body) = save(&h.router, [200, 10, 10], "Asha", "21BCE0001").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Face saved successfully");

    let (status, body) = recognize(&h.router, [195, 12, 8]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Face recognition completed.");
    assert_eq!(body["faces"], serde_json::json!(["Asha", "21BCE0001"]));
}

#[tokio::test]
async fn names_with_underscores_survive_the_round_trip() {
    let h = harness();
    save(&h.router, [10, 200, 10], "Ravi_Kumar", "21BCE0002").await;

    let (status, body) = recognize(&h.router, [10, 200, 10]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["faces"], serde_json::json!(["Ravi_Kumar", "21BCE0002"]));
}

#[tokio::test]
async fn known_face_is_not_added_twice() {
    let h = harness();
    save(&h.router, [200, 10, 10], "Asha", "21BCE0001").await;

    let (status, body) = save(&h.router, [200, 10, 10], "Someone", "99").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Face saved successfully");
    assert_eq!(face_count(&h.router).await, 1);

    let (_, body) = recognize(&h.router, [200, 10, 10]).await;
    assert_eq!(body["faces"], serde_json::json!(["Asha", "21BCE0001"]));
}

#[tokio::test]
async fn save_without_image() {
    let h = harness();
    let (status, body) = post(
        &h.router,
        "/save-face",
        vec![Part::Text("name", "Asha"), Part::Text("reg_no", "21BCE0001")],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No image file uploaded");
}

#[tokio::test]
async fn save_without_name_or_reg_no() {
    let h = harness();

    let (status, body) = post(
        &h.router,
        "/save-face",
        vec![Part::File("image", png([200, 10, 10])), Part::Text("reg_no", "21BCE0001")],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Name or registration number is missing");

    let (status, body) = save(&h.router, [200, 10, 10], "Asha", "").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Name or registration number is missing");
    assert_eq!(face_count(&h.router).await, 0);
}

#[tokio::test]
async fn save_rejects_reg_no_with_separator() {
    let h = harness();
    let (status, body) = save(&h.router, [200, 10, 10], "Asha", "21_BCE").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("registration number"));
    assert_eq!(face_count(&h.router).await, 0);
}

#[tokio::test]
async fn save_with_no_face_fails() {
    let h = harness();
    let (status, body) = save(&h.router, [0, 0, 0], "Asha", "21BCE0001").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Failed to save face data.");
    assert_eq!(body["details"], "no face detected in the image");
}

#[tokio::test]
async fn save_with_undecodable_image_fails() {
    let h = harness();
    let (status, body) = post(
        &h.router,
        "/save-face",
        vec![
            Part::File("image", b"definitely not an image".to_vec()),
            Part::Text("name", "Asha"),
            Part::Text("reg_no", "21BCE0001"),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Failed to save face data.");
    assert!(body["details"].as_str().unwrap().contains("could not read image"));
}

#[tokio::test]
async fn recognize_without_frame() {
    let h = harness();
    let (status, body) = post(
        &h.router,
        "/recognize-face",
        vec![Part::Text("classroomId", "2")],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No image file uploaded");
}

#[tokio::test]
async fn text_part_named_frame_is_not_a_file() {
    let h = harness();
    let (status, body) = post(
        &h.router,
        "/recognize-face",
        vec![Part::Text("frame", "hello")],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No image file uploaded");
}

#[tokio::test]
async fn recognize_unknown_face() {
    let h = harness();
    save(&h.router, [200, 10, 10], "Asha", "21BCE0001").await;

    let (status, body) = recognize(&h.router, [10, 10, 200]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "No faces detected in the image.");
}

#[tokio::test]
async fn recognize_with_no_face() {
    let h = harness();
    let (status, body) = recognize(&h.router, [0, 0, 0]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "No faces detected in the image.");
}

#[tokio::test]
async fn recognize_with_undecodable_image_fails() {
    let h = harness();
    let (status, body) = post(
        &h.router,
        "/recognize-face",
        vec![Part::File("frame", b"garbage".to_vec())],
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Failed to recognize face.");
    assert!(body["details"].is_string());
}

#[tokio::test]
async fn non_multipart_body_counts_as_missing_upload() {
    let h = harness();
    let request = Request::post("/recognize-face")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"frame":"x"}"#))
        .unwrap();
    let (status, body) = send(&h.router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No image file uploaded");
}

#[tokio::test]
async fn oversized_upload_is_rejected() {
    let h = harness_with_limit(64);
    let (status, _) = post(
        &h.router,
        "/recognize-face",
        vec![Part::File("frame", vec![7u8; 4096])],
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn health_reports_enrolled_faces() {
    let h = harness();
    assert_eq!(face_count(&h.router).await, 0);
    save(&h.router, [200, 10, 10], "Asha", "21BCE0001").await;
    save(&h.router, [10, 200, 10], "Ravi", "21BCE0002").await;
    assert_eq!(face_count(&h.router).await, 2);
}

#[tokio::test]
async fn cors_preflight_allows_frontend_origin() {
    let h = harness();
    let request = Request::builder()
        .method("OPTIONS")
        .uri("/save-face")
        .header(header::ORIGIN, "http://localhost:3000")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();
    let response = h.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "http://localhost:3000"
    );
}

//! HTTP surface tests against an in-memory coordinator.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use image::DynamicImage;
use tower::ServiceExt;
use vigil_core::{
    BoundingBox, Embedding, EncodeError, FaceLocalizer, IdentityEncoder, LocalizeError, Metric,
};
use vigil_store::IdentityStore;
use vigild::{create_router, AppState, SharedState};

const DIM: usize = 4;
const BOUNDARY: &str = "vigil-test-boundary";

// ── Test doubles ──────────────────────────────────────────────────────────────

struct FakeLocalizer {
    boxes: Vec<BoundingBox>,
}

impl FaceLocalizer for FakeLocalizer {
    fn localize(&self, _image: &DynamicImage) -> Result<Vec<BoundingBox>, LocalizeError> {
        Ok(self.boxes.clone())
    }
}

struct FakeEncoder;

impl IdentityEncoder for FakeEncoder {
    fn encode(&self, _face: &DynamicImage) -> Result<Embedding, EncodeError> {
        Ok(Embedding::new(vec![0.5; DIM]))
    }

    fn embedding_dim(&self) -> usize {
        DIM
    }

    fn metric(&self) -> Metric {
        Metric::similarity(0.6)
    }
}

async fn test_state(boxes: Vec<BoundingBox>) -> SharedState {
    let identities = IdentityStore::open(Path::new(":memory:"), DIM).await.unwrap();
    AppState::new(identities, Arc::new(FakeLocalizer { boxes }), Arc::new(FakeEncoder))
}

// ── Request helpers ───────────────────────────────────────────────────────────

fn multipart_body(texts: &[(&str, &str)], image: Option<(&str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in texts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
        );
        body.extend_from_slice(value.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    if let Some((content_type, bytes)) = image {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            b"Content-Disposition: form-data; name=\"image\"; filename=\"frame.jpg\"\r\n",
        );
        body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn post_multipart(uri: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// A real in-memory JPEG so register handlers can decode it.
fn sample_jpeg() -> Vec<u8> {
    let frame = image::RgbImage::from_pixel(64, 64, image::Rgb([120, 120, 120]));
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(frame)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Jpeg)
        .unwrap();
    bytes
}

// ── Frame endpoints ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_get_frame_before_any_upload_is_404() {
    let app = create_router(test_state(vec![]).await);

    let response = app.oneshot(get("/get_frame")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["detail"], "No frame available");
}

#[tokio::test]
async fn test_upload_then_get_frame_roundtrip() {
    let app = create_router(test_state(vec![]).await);
    let jpeg = sample_jpeg();

    let response = app
        .clone()
        .oneshot(post_multipart(
            "/upload_frame",
            multipart_body(&[], Some(("image/jpeg", &jpeg))),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(get("/get_frame")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "image/jpeg"
    );
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(bytes.as_ref(), jpeg.as_slice());
}

#[tokio::test]
async fn test_upload_frame_rejects_png() {
    let app = create_router(test_state(vec![]).await);

    let response = app
        .oneshot(post_multipart(
            "/upload_frame",
            multipart_body(&[], Some(("image/png", b"not-a-frame"))),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upload_frame_without_image_field() {
    let app = create_router(test_state(vec![]).await);

    let response = app
        .oneshot(post_multipart(
            "/upload_frame",
            multipart_body(&[("other", "x")], None),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["detail"], "missing required field: image");
}

// ── Detection endpoints ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_get_detection_before_any_notification_is_404() {
    let app = create_router(test_state(vec![]).await);

    let response = app.oneshot(get("/get_detection")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["detail"], "No detection available");
}

#[tokio::test]
async fn test_notification_updates_detection_and_frame() {
    let app = create_router(test_state(vec![]).await);
    let jpeg = sample_jpeg();

    let response = app
        .clone()
        .oneshot(post_multipart(
            "/notification",
            multipart_body(
                &[
                    ("status", "known person detected"),
                    ("detail", "admin (0.912)"),
                ],
                Some(("image/jpeg", &jpeg)),
            ),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.clone().oneshot(get("/get_detection")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "known person detected");
    assert_eq!(body["detail"], "admin (0.912)");

    // The notification frame replaces the latest frame too
    let response = app.oneshot(get("/get_frame")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_notification_requires_status_and_detail() {
    let app = create_router(test_state(vec![]).await);
    let jpeg = sample_jpeg();

    let response = app
        .oneshot(post_multipart(
            "/notification",
            multipart_body(&[("status", "something detected")], Some(("image/jpeg", &jpeg))),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["detail"], "missing required field: detail");
}

// ── Registration ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_register_face_happy_path() {
    let state = test_state(vec![BoundingBox::new(8, 8, 40, 40)]).await;
    let app = create_router(state.clone());

    let response = app
        .oneshot(post_multipart(
            "/register_face",
            multipart_body(&[("name", "admin")], Some(("image/jpeg", &sample_jpeg()))),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["message"], "Face registered successfully for user: admin");
    assert_eq!(state.identities.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_register_face_accepts_png() {
    let state = test_state(vec![BoundingBox::new(8, 8, 40, 40)]).await;
    let app = create_router(state.clone());

    let frame = image::RgbImage::from_pixel(64, 64, image::Rgb([90, 90, 90]));
    let mut png = Vec::new();
    image::DynamicImage::ImageRgb8(frame)
        .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .unwrap();

    let response = app
        .oneshot(post_multipart(
            "/register_face",
            multipart_body(&[("name", "admin")], Some(("image/png", &png))),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(state.identities.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_register_face_rejects_multiple_faces() {
    let state = test_state(vec![
        BoundingBox::new(0, 0, 20, 20),
        BoundingBox::new(30, 30, 60, 60),
    ])
    .await;
    let app = create_router(state.clone());

    let response = app
        .oneshot(post_multipart(
            "/register_face",
            multipart_body(&[("name", "admin")], Some(("image/jpeg", &sample_jpeg()))),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["detail"], "expected exactly one face, found 2");
    // Nothing was persisted
    assert_eq!(state.identities.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_register_face_rejects_zero_faces() {
    let state = test_state(vec![]).await;
    let app = create_router(state.clone());

    let response = app
        .oneshot(post_multipart(
            "/register_face",
            multipart_body(&[("name", "admin")], Some(("image/jpeg", &sample_jpeg()))),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(state.identities.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_register_face_rejects_undecodable_image() {
    let app = create_router(test_state(vec![BoundingBox::new(0, 0, 10, 10)]).await);

    let response = app
        .oneshot(post_multipart(
            "/register_face",
            multipart_body(&[("name", "admin")], Some(("image/jpeg", b"garbage"))),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

// ── Health ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_health_reports_enrollment_count() {
    let state = test_state(vec![]).await;
    state
        .identities
        .enroll("admin", &[Embedding::new(vec![0.1; DIM])])
        .await
        .unwrap();
    let app = create_router(state);

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["identities"], 1);
}

// ── Concurrency ───────────────────────────────────────────────────────────────

/// Hammer the frame slot with two writers using distinct uniform byte
/// patterns while a reader checks every observed frame is uniform. A torn
/// read would surface as a mixed-pattern frame.
#[tokio::test]
async fn test_concurrent_frame_access_never_tears() {
    let state = test_state(vec![]).await;

    let mut writers = Vec::new();
    for pattern in [0xAAu8, 0xBBu8] {
        let state = state.clone();
        writers.push(tokio::spawn(async move {
            for _ in 0..200 {
                *state.latest_frame.write().await = Some(vec![pattern; 4096]);
                tokio::task::yield_now().await;
            }
        }));
    }

    let reader = {
        let state = state.clone();
        tokio::spawn(async move {
            for _ in 0..400 {
                if let Some(frame) = state.latest_frame.read().await.as_ref() {
                    let first = frame[0];
                    assert!(
                        frame.iter().all(|&b| b == first),
                        "observed a torn frame read"
                    );
                }
                tokio::task::yield_now().await;
            }
        })
    };

    for writer in writers {
        writer.await.unwrap();
    }
    reader.await.unwrap();
}

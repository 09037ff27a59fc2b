use axum::extract::{Multipart, State};
use axum::http::header::CONTENT_TYPE;
use axum::Json;
use serde::Serialize;
use vigil_core::{crop_face, Detection};

use crate::error::{ApiError, ApiResult};
use crate::state::SharedState;

const FRAME_CONTENT_TYPES: &[&str] = &["image/jpeg", "image/jpg"];
const REGISTER_CONTENT_TYPES: &[&str] = &["image/jpeg", "image/jpg", "image/png"];

#[derive(Serialize)]
pub struct Ack {
    pub message: String,
}

#[derive(Serialize)]
pub struct Health {
    pub version: &'static str,
    pub identities: u64,
}

/// One image part pulled out of a multipart body.
struct ImagePart {
    bytes: Vec<u8>,
}

/// Walk the multipart fields, collecting the `image` part and any named text
/// fields the caller asked for. Unknown fields are ignored.
async fn read_multipart(
    multipart: &mut Multipart,
    accepted_types: &[&str],
    text_fields: &[&str],
) -> ApiResult<(Option<ImagePart>, Vec<(String, String)>)> {
    let mut image = None;
    let mut texts = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::invalid_input(format!("malformed multipart body: {e}")))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if name == "image" {
            let content_type = field.content_type().unwrap_or("").to_string();
            if !accepted_types.contains(&content_type.as_str()) {
                return Err(ApiError::invalid_input(format!(
                    "unsupported image content type: {content_type:?}"
                )));
            }
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::invalid_input(format!("failed to read image field: {e}")))?
                .to_vec();
            if bytes.is_empty() {
                return Err(ApiError::invalid_input("image field is empty"));
            }
            image = Some(ImagePart { bytes });
        } else if text_fields.contains(&name.as_str()) {
            let value = field
                .text()
                .await
                .map_err(|e| ApiError::invalid_input(format!("failed to read field {name}: {e}")))?;
            texts.push((name, value));
        }
    }

    Ok((image, texts))
}

fn require_text(texts: &[(String, String)], name: &str) -> ApiResult<String> {
    texts
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v.clone())
        .ok_or_else(|| ApiError::invalid_input(format!("missing required field: {name}")))
}

/// POST /upload_frame — store the latest camera frame (JPEG only).
pub async fn upload_frame(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> ApiResult<Json<Ack>> {
    let (image, _) = read_multipart(&mut multipart, FRAME_CONTENT_TYPES, &[]).await?;
    let image = image.ok_or_else(|| ApiError::invalid_input("missing required field: image"))?;

    let size = image.bytes.len();
    *state.latest_frame.write().await = Some(image.bytes);

    tracing::debug!(size, "frame uploaded");
    Ok(Json(Ack {
        message: "Frame uploaded successfully".to_string(),
    }))
}

/// GET /get_frame — return the latest frame as raw JPEG bytes.
pub async fn get_frame(
    State(state): State<SharedState>,
) -> ApiResult<([(axum::http::HeaderName, &'static str); 1], Vec<u8>)> {
    let frame = state.latest_frame.read().await;
    match frame.as_ref() {
        Some(bytes) => Ok(([(CONTENT_TYPE, "image/jpeg")], bytes.clone())),
        None => Err(ApiError::not_found("No frame available")),
    }
}

/// POST /notification — agent posts a detection result with its annotated frame.
///
/// The frame and the detection are updated under separate locks, one after
/// the other. The pair is not one transaction; each value is individually
/// never torn, which is the guarantee readers rely on.
pub async fn notification(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> ApiResult<Json<Ack>> {
    let (image, texts) =
        read_multipart(&mut multipart, FRAME_CONTENT_TYPES, &["status", "detail"]).await?;
    let image = image.ok_or_else(|| ApiError::invalid_input("missing required field: image"))?;
    let status = require_text(&texts, "status")?;
    let detail = require_text(&texts, "detail")?;

    *state.latest_frame.write().await = Some(image.bytes);
    *state.latest_detection.write().await = Some(Detection::new(&status, &detail));

    tracing::info!(%status, %detail, "detection notification received");
    Ok(Json(Ack {
        message: "Notification received".to_string(),
    }))
}

/// GET /get_detection — return the latest detection result.
pub async fn get_detection(State(state): State<SharedState>) -> ApiResult<Json<Detection>> {
    let detection = state.latest_detection.read().await;
    match detection.as_ref() {
        Some(d) => Ok(Json(d.clone())),
        None => Err(ApiError::not_found("No detection available")),
    }
}

/// POST /register_face — enroll a new identity from a photo with exactly one face.
pub async fn register_face(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> ApiResult<Json<Ack>> {
    let (image, texts) =
        read_multipart(&mut multipart, REGISTER_CONTENT_TYPES, &["name"]).await?;
    let image = image.ok_or_else(|| ApiError::invalid_input("missing required field: image"))?;
    let name = require_text(&texts, "name")?;
    if name.trim().is_empty() {
        return Err(ApiError::invalid_input("name must not be empty"));
    }

    let photo = image::load_from_memory(&image.bytes)
        .map_err(|e| ApiError::Processing(format!("failed to decode image: {e}")))?;

    let boxes = state.localizer.localize(&photo)?;
    if boxes.len() != 1 {
        return Err(ApiError::invalid_input(format!(
            "expected exactly one face, found {}",
            boxes.len()
        )));
    }

    let face = crop_face(&photo, &boxes[0])?;
    let embedding = state.encoder.encode(&face)?;
    let id = state.identities.enroll(&name, &[embedding]).await?;

    tracing::info!(id, %name, "face registered");
    Ok(Json(Ack {
        message: format!("Face registered successfully for user: {name}"),
    }))
}

/// GET /health — liveness probe with enrollment count.
pub async fn health(State(state): State<SharedState>) -> ApiResult<Json<Health>> {
    let identities = state.identities.count().await?;
    Ok(Json(Health {
        version: env!("CARGO_PKG_VERSION"),
        identities,
    }))
}

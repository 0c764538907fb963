use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use super::services::{compress, decode_base64_image, ext_from_mime, publish, ImageKind};
use crate::state::AppState;

const MAX_UPLOAD_BYTES: usize = 12 * 1024 * 1024;

#[derive(Debug, Deserialize)]
pub struct Base64Upload {
    /// Raw base64 or a `data:image/...;base64,` URL.
    pub image_b64: String,
}

#[derive(Debug, Serialize)]
pub struct UploadedImage {
    pub kind: ImageKind,
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub bytes: usize,
    pub quality: u8,
}

pub fn images_routes() -> Router<AppState> {
    Router::new()
        .route("/images/:kind", post(upload_multipart))
        .route("/images/:kind/base64", post(upload_base64))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}

fn image_kind(raw: &str) -> Result<ImageKind, (StatusCode, String)> {
    ImageKind::parse(raw).ok_or((
        StatusCode::NOT_FOUND,
        "Unknown image kind (avatar, logo or gallery)".to_string(),
    ))
}

async fn process(
    state: &AppState,
    kind: ImageKind,
    raw: Vec<u8>,
) -> Result<Json<UploadedImage>, (StatusCode, String)> {
    let compressed = tokio::task::spawn_blocking(move || compress(&raw, kind.limits()))
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .map_err(|e| {
            warn!(error = %format!("{e:#}"), "image rejected");
            (StatusCode::UNPROCESSABLE_ENTITY, "Could not read that image.".to_string())
        })?;

    let (width, height, quality, bytes) = (
        compressed.width,
        compressed.height,
        compressed.quality,
        compressed.bytes.len(),
    );
    let url = publish(state.storage.as_deref(), kind, compressed)
        .await
        .map_err(|e| {
            error!(error = %format!("{e:#}"), "image publish failed");
            (StatusCode::BAD_GATEWAY, format!("{e:#}"))
        })?;

    info!(kind = kind.as_str(), width, height, quality, bytes, "image stored");
    Ok(Json(UploadedImage {
        kind,
        url,
        width,
        height,
        bytes,
        quality,
    }))
}

/// POST /images/:kind (multipart, field `file`)
#[instrument(skip(state, mp))]
pub async fn upload_multipart(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    mut mp: Multipart,
) -> Result<Json<UploadedImage>, (StatusCode, String)> {
    let kind = image_kind(&kind)?;
    let mut upload = None;
    while let Ok(Some(field)) = mp.next_field().await {
        if field.name() != Some("file") {
            continue;
        }
        let content_type = field
            .content_type()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "application/octet-stream".into());
        if ext_from_mime(&content_type).is_none() {
            return Err((
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                format!("Unsupported image type {content_type}"),
            ));
        }
        let data = field
            .bytes()
            .await
            .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
        upload = Some(data.to_vec());
        break;
    }
    let raw = upload.ok_or((StatusCode::BAD_REQUEST, "file is required".to_string()))?;
    process(&state, kind, raw).await
}

/// POST /images/:kind/base64 { image_b64 }
#[instrument(skip(state, body))]
pub async fn upload_base64(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Json(body): Json<Base64Upload>,
) -> Result<Json<UploadedImage>, (StatusCode, String)> {
    let kind = image_kind(&kind)?;
    let raw = decode_base64_image(&body.image_b64)
        .map_err(|_| (StatusCode::BAD_REQUEST, "invalid base64".to_string()))?;
    process(&state, kind, raw).await
}

//! HTTP operation handlers (§4.6, §7). Each documented endpoint maps to one
//! function here; `CiraError` is turned into the matching HTTP status by
//! [`ApiError`] rather than every handler hand-rolling a status code.

use std::path::PathBuf;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode as HttpStatus};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use futures::stream;
use serde::Deserialize;

use crate::error::{CiraError, StatusCode};
use crate::image_utils::encode_jpeg;

use super::state::AppState;

/// Wraps a [`CiraError`] so it can be returned directly from a handler.
pub struct ApiError(pub CiraError);

impl From<CiraError> for ApiError {
    fn from(e: CiraError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let http_status = match self.0.status() {
            StatusCode::Input => HttpStatus::BAD_REQUEST,
            StatusCode::File => HttpStatus::NOT_FOUND,
            StatusCode::Model => HttpStatus::SERVICE_UNAVAILABLE,
            StatusCode::Memory => HttpStatus::INTERNAL_SERVER_ERROR,
            StatusCode::Generic => HttpStatus::INTERNAL_SERVER_ERROR,
            StatusCode::Ok => HttpStatus::OK,
        };
        (http_status, self.0.message().to_string()).into_response()
    }
}

/// `GET /health` (§4.6 supplemented feature, §6).
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// `GET /stats` (§6).
pub async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.context.stats())
}

/// `GET /result` (§4.1, §6): the raw bounded JSON body, served as-is rather
/// than re-wrapped in another JSON layer.
pub async fn result(State(state): State<AppState>) -> Result<Response, ApiError> {
    let body = state.context.result_json()?;
    Ok((
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response())
}

/// §5/§7: "HTTP reads of `frame/latest` that arrive before any frame has
/// been captured return a `ServiceUnavailable`-equivalent error" — a
/// distinct case from a genuine file/input failure, so it bypasses
/// [`ApiError`]'s `CiraError` mapping and returns 503 directly.
fn no_frame_yet() -> Response {
    (HttpStatus::SERVICE_UNAVAILABLE, "no frame captured yet").into_response()
}

/// `GET /snapshot` (§7): a single JPEG of the most recently captured raw
/// frame, independent of the annotated frame-file.
pub async fn snapshot(State(state): State<AppState>) -> Result<Response, ApiError> {
    let Some(frame) = state.context.current_frame() else {
        return Ok(no_frame_yet());
    };
    let jpeg = encode_jpeg(&frame)?;
    Ok((
        [(header::CONTENT_TYPE, "image/jpeg")],
        jpeg,
    )
        .into_response())
}

/// `GET /frame/latest` (§4.5, §7): the most recently published annotated
/// frame-file, with its sequence counter in `X-Frame-Sequence`.
pub async fn frame_latest(State(state): State<AppState>) -> Result<Response, ApiError> {
    let Some(path): Option<PathBuf> = state.annotator.published_path() else {
        return Ok(no_frame_yet());
    };
    let bytes = std::fs::read(&path).map_err(|e| CiraError::File(format!("reading frame-file: {e}")))?;
    let sequence = state.annotator.sequence();
    Ok((
        [
            (header::CONTENT_TYPE, "image/jpeg".to_string()),
            ("X-Frame-Sequence".parse().unwrap(), sequence.to_string()),
        ],
        bytes,
    )
        .into_response())
}

const MJPEG_BOUNDARY: &str = "cira-frame-boundary";
const MJPEG_INTERVAL: Duration = Duration::from_millis(100);

/// `GET /stream` (§4.6, §7): an MJPEG multipart stream built by polling the
/// latest raw frame on a fixed cadence and re-encoding it each tick.
pub async fn mjpeg_stream(State(state): State<AppState>) -> Response {
    let body_stream = stream::unfold(state, |state| async move {
        tokio::time::sleep(MJPEG_INTERVAL).await;
        let chunk = match state.context.current_frame() {
            Some(frame) => match encode_jpeg(&frame) {
                Ok(jpeg) => mjpeg_part(&jpeg),
                Err(_) => Bytes::new(),
            },
            None => Bytes::new(),
        };
        Some((Ok::<Bytes, std::io::Error>(chunk), state))
    });

    Response::builder()
        .status(HttpStatus::OK)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/x-mixed-replace; boundary={MJPEG_BOUNDARY}"),
        )
        .body(Body::from_stream(body_stream))
        .expect("response with streaming body is always constructible")
}

fn mjpeg_part(jpeg: &[u8]) -> Bytes {
    let mut part = format!(
        "--{MJPEG_BOUNDARY}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        jpeg.len()
    )
    .into_bytes();
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    Bytes::from(part)
}

#[derive(Debug, Deserialize)]
pub struct LoadModelRequest {
    pub model_dir: String,
}

/// `POST /model/load` (§4.1, §4.2, §7): swaps the loaded model without a
/// process restart.
pub async fn load_model(
    State(state): State<AppState>,
    Json(req): Json<LoadModelRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.context.load(&PathBuf::from(req.model_dir))?;
    Ok(Json(serde_json::json!({ "status": "loaded" })))
}

#[derive(Debug, Deserialize, Default)]
pub struct StartCameraRequest {
    pub device_id: Option<i32>,
}

/// `POST /camera/start` (§4.4, §7). Idempotent — starting an already
/// running capture worker is not an error.
pub async fn camera_start(
    State(state): State<AppState>,
    body: Option<Json<StartCameraRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let device_id = body
        .and_then(|Json(req)| req.device_id)
        .unwrap_or(state.context.config().default_camera_device);

    state
        .capture
        .start(state.context.clone(), state.annotator.clone(), device_id)?;
    Ok(Json(serde_json::json!({ "status": "started", "device_id": device_id })))
}

/// `POST /camera/stop` (§4.4, §7). Idempotent — stopping an already
/// stopped capture worker is not an error.
pub async fn camera_stop(State(state): State<AppState>) -> impl IntoResponse {
    state.capture.stop();
    Json(serde_json::json!({ "status": "stopped" }))
}

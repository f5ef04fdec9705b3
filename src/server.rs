//! HTTP surface: `/listen` and `/calibrate` over any upstream L16
//! stream, the gate control endpoints, and the mic frontend route.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast;
use tracing::{debug, error, warn};

use crate::config::VadSettings;
use crate::source::mic::MicCapture;
use crate::source::{SourceError, SourceLoader};
use crate::vad::classifier::WebRtcClassifier;
use crate::vad::gate::VadGate;
use crate::vad::segmenter::Segmenter;
use crate::vad::VadError;

const CACHE_CONTROL: &str = "no-cache, no-store, must-revalidate";
const CALIBRATE_TIMEOUT_S: u32 = 10;

#[derive(Clone)]
pub struct AppState {
    pub loader: Arc<dyn SourceLoader>,
    pub vad: VadSettings,
    pub listen_timeout_s: u32,
    pub gate: VadGate,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/listen", get(listen))
        .route("/calibrate", get(calibrate))
        .route("/rest/active", get(gate_active).post(gate_activate))
        .route("/rest/stop", post(gate_stop))
        .with_state(state)
}

/// Routes for the mic frontend binary.
pub fn mic_router(capture: Arc<MicCapture>) -> Router {
    Router::new()
        .route("/mic", get(stream_mic))
        .with_state(capture)
}

enum DetectError {
    Source(SourceError),
    Vad(VadError),
}

impl IntoResponse for DetectError {
    fn into_response(self) -> Response {
        match self {
            DetectError::Vad(VadError::Timeout { seconds, .. }) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("no voice activity within {seconds}s") })),
            )
                .into_response(),
            DetectError::Source(SourceError::UnsupportedContentType(content_type)) => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                Json(json!({ "error": format!("unsupported content type {content_type:?}") })),
            )
                .into_response(),
            DetectError::Source(e) => (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response(),
            DetectError::Vad(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListenQuery {
    url: String,
}

/// Block until one segment is detected on the stream at `url` and
/// return its PCM under the upstream content type.
async fn listen(State(state): State<AppState>, Query(query): Query<ListenQuery>) -> Response {
    let worker = tokio::task::spawn_blocking(move || -> Result<(String, Vec<u8>), DetectError> {
        let mut source = state
            .loader
            .open(&query.url, 0)
            .map_err(DetectError::Source)?;
        let content_type = source.format().content_type();

        let mut config = state.vad.segmenter_config();
        config.timeout_s = state.listen_timeout_s;
        let mut segmenter =
            Segmenter::new(config, WebRtcClassifier::new(state.vad.classifier_mode()));

        let segment = segmenter.detect(&mut source).map_err(DetectError::Vad)?;
        debug!(
            "Listen detected {} frames at offset {}",
            segment.frames.len(),
            segment.offset
        );

        Ok((content_type, segment.to_le_bytes()))
    })
    .await;

    match worker {
        Ok(Ok((content_type, pcm))) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, content_type),
                (header::CACHE_CONTROL, CACHE_CONTROL.to_string()),
            ],
            pcm,
        )
            .into_response(),
        Ok(Err(e)) => e.into_response(),
        Err(e) => {
            error!("Listen worker failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct CalibrateQuery {
    url: String,
    #[serde(default = "default_calibrate_sec")]
    sec: u64,
}

fn default_calibrate_sec() -> u64 {
    10
}

/// Run detection against `url` for a wall-clock window to warm the
/// classifier up. Timeouts inside the window are expected and
/// swallowed.
async fn calibrate(State(state): State<AppState>, Query(query): Query<CalibrateQuery>) -> Response {
    let worker = tokio::task::spawn_blocking(move || -> Result<(), DetectError> {
        let mut source = state
            .loader
            .open(&query.url, 0)
            .map_err(DetectError::Source)?;

        let mut config = state.vad.segmenter_config();
        config.timeout_s = CALIBRATE_TIMEOUT_S;
        config.storage = None;
        let mut segmenter =
            Segmenter::new(config, WebRtcClassifier::new(state.vad.classifier_mode()));

        let deadline = Instant::now() + Duration::from_secs(query.sec);
        while Instant::now() < deadline {
            match segmenter.detect(&mut source) {
                Ok(segment) if segment.consumed == 0 => break,
                Ok(_) => {}
                Err(VadError::Timeout { .. }) => {}
                Err(e) => return Err(DetectError::Vad(e)),
            }
        }

        Ok(())
    })
    .await;

    match worker {
        Ok(Ok(())) => StatusCode::OK.into_response(),
        Ok(Err(e)) => e.into_response(),
        Err(e) => {
            error!("Calibrate worker failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn gate_active(State(state): State<AppState>) -> &'static str {
    if state.gate.is_active() {
        "True"
    } else {
        "False"
    }
}

async fn gate_activate(State(state): State<AppState>) -> &'static str {
    state.gate.set_active(true);
    "True"
}

async fn gate_stop(State(state): State<AppState>) -> StatusCode {
    state.gate.set_active(false);
    StatusCode::OK
}

/// Continuous `audio/L16` stream of the captured microphone.
async fn stream_mic(State(capture): State<Arc<MicCapture>>) -> Response {
    let content_type = capture.format().content_type();
    let rx = capture.subscribe();

    let stream = futures_util::stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(chunk) => return Some((Ok::<Vec<u8>, std::convert::Infallible>(chunk), rx)),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("Mic subscriber lagged, skipped {} frames", missed);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    });

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, CACHE_CONTROL.to_string()),
        ],
        Body::from_stream(stream),
    )
        .into_response()
}

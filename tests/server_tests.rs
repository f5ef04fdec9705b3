use std::sync::Arc;

use voicegate::config::VadSettings;
use voicegate::server::{self, AppState};
use voicegate::source::l16::L16Format;
use voicegate::source::{FrameSource, SourceError, SourceLoader};
use voicegate::vad::frame::Frame;
use voicegate::vad::gate::VadGate;

const RATE: u32 = 16000;
const FRAME_LEN: usize = 480;

/// Serves a fixed number of silence frames; enough to exercise the
/// timeout and exhaustion paths without a live microphone.
struct SilenceLoader {
    frames: usize,
}

struct SilenceSource {
    format: L16Format,
    remaining: usize,
}

impl Iterator for SilenceSource {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(Frame::new(vec![0i16; FRAME_LEN], RATE, 1))
    }
}

impl FrameSource for SilenceSource {
    fn format(&self) -> L16Format {
        self.format
    }
}

impl SourceLoader for SilenceLoader {
    fn open(&self, _url: &str, _offset: u64) -> Result<Box<dyn FrameSource>, SourceError> {
        Ok(Box::new(SilenceSource {
            format: L16Format {
                rate: RATE,
                channels: 1,
                frame_size: FRAME_LEN,
            },
            remaining: self.frames,
        }))
    }
}

/// Always refuses the stream, as a reader of a non-L16 source must.
struct RejectingLoader;

impl SourceLoader for RejectingLoader {
    fn open(&self, _url: &str, _offset: u64) -> Result<Box<dyn FrameSource>, SourceError> {
        Err(SourceError::UnsupportedContentType(
            "text/plain".to_string(),
        ))
    }
}

async fn spawn_app(loader: Arc<dyn SourceLoader>, listen_timeout_s: u32) -> (String, VadGate) {
    let gate = VadGate::new();
    let state = AppState {
        loader,
        vad: VadSettings::default(),
        listen_timeout_s,
        gate: gate.clone(),
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, server::router(state)).await.unwrap();
    });

    (format!("http://{}", addr), gate)
}

#[tokio::test]
async fn test_gate_endpoints() {
    let (base, gate) = spawn_app(Arc::new(SilenceLoader { frames: 0 }), 1).await;
    let client = reqwest::Client::new();

    let body = client
        .get(format!("{}/rest/active", base))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!("False", body);

    let body = client
        .post(format!("{}/rest/active", base))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!("True", body);
    assert!(gate.is_active());

    let response = client
        .post(format!("{}/rest/stop", base))
        .send()
        .await
        .unwrap();
    assert_eq!(200, response.status().as_u16());
    assert!(!gate.is_active());

    let body = client
        .get(format!("{}/rest/active", base))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!("False", body);
}

#[tokio::test]
async fn test_listen_times_out_without_voice() {
    // 60 frames of silence is past the 1s (33 frame) timeout.
    let (base, _) = spawn_app(Arc::new(SilenceLoader { frames: 60 }), 1).await;

    let response = reqwest::Client::new()
        .get(format!("{}/listen?url=http://upstream/mic", base))
        .send()
        .await
        .unwrap();

    assert_eq!(400, response.status().as_u16());
}

#[tokio::test]
async fn test_listen_on_short_silence_returns_empty_pcm() {
    // The source exhausts before the timeout: an empty 200 under the
    // upstream content type.
    let (base, _) = spawn_app(Arc::new(SilenceLoader { frames: 10 }), 1).await;

    let response = reqwest::Client::new()
        .get(format!("{}/listen?url=http://upstream/mic", base))
        .send()
        .await
        .unwrap();

    assert_eq!(200, response.status().as_u16());
    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert_eq!("audio/L16; rate=16000; channels=1; frame_size=480", content_type);
    assert!(response.bytes().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_listen_rejects_unsupported_content_type() {
    let (base, _) = spawn_app(Arc::new(RejectingLoader), 1).await;

    let response = reqwest::Client::new()
        .get(format!("{}/listen?url=http://upstream/mic", base))
        .send()
        .await
        .unwrap();

    assert_eq!(415, response.status().as_u16());
}

#[tokio::test]
async fn test_calibrate_completes_on_silence() {
    let (base, _) = spawn_app(Arc::new(SilenceLoader { frames: 60 }), 1).await;

    let response = reqwest::Client::new()
        .get(format!("{}/calibrate?url=http://upstream/mic&sec=1", base))
        .send()
        .await
        .unwrap();

    assert_eq!(200, response.status().as_u16());
}

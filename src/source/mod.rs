//! Frame sources: parsing `audio/L16` streams, pulling them over
//! HTTP, and capturing them from a microphone.

pub mod client;
pub mod l16;
pub mod mic;

use thiserror::Error;

use crate::vad::frame::Frame;
use l16::L16Format;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("unsupported content type {0:?}, expected audio/L16 with rate, channels and frame_size parameters")]
    UnsupportedContentType(String),

    #[error("source response carries no content type")]
    MissingContentType,

    #[error("source request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// A single-pass, ordered stream of frames with a known wire format.
pub trait FrameSource: Iterator<Item = Frame> {
    fn format(&self) -> L16Format;
}

/// Opens a frame source at a byte offset into the overall signal.
/// Implemented over HTTP for production and in memory for tests.
pub trait SourceLoader: Send + Sync {
    fn open(&self, url: &str, offset: u64) -> Result<Box<dyn FrameSource>, SourceError>;
}

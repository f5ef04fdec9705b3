//! The segmentation core: a per-frame voice classifier, a sliding
//! activity window, and the state machine that cuts padded speech
//! segments out of an unbounded frame stream.

pub mod classifier;
pub mod frame;
pub mod gate;
pub mod segment;
pub mod segmenter;
pub mod wav;
pub mod window;

use thiserror::Error;

use frame::Frame;
use segment::Segment;

/// Common seam over the frame-wise segmenter and the gated variant so
/// drivers can run either against any frame source.
pub trait SpeechDetector {
    /// Run one invocation, blocking until a segment is complete or the
    /// stream ends.
    fn next_segment(
        &mut self,
        frames: &mut dyn Iterator<Item = Frame>,
    ) -> Result<Segment, VadError>;
}

#[derive(Debug, Error)]
pub enum VadError {
    #[error("invalid sample format: {0}")]
    InvalidSampleFormat(String),

    #[error("unsupported sampling rate {0}, expected 16000")]
    UnsupportedRate(u32),

    #[error("unsupported frame duration {0}ms, expected one of 10, 20 or 30")]
    InvalidFrameDuration(u32),

    #[error("no voice activity within timeout ({seconds}s)")]
    Timeout {
        seconds: u32,
        /// Frames read from the source before the timeout fired, so
        /// callers can advance their source offset and continue.
        consumed: usize,
    },
}

//! The `audio/L16` wire format: raw little-endian int16 samples,
//! interleaved by channel, packed into fixed-size frames with no
//! framing or length prefix. Everything a reader needs travels in the
//! MIME parameters.

use std::io::Read;

use tracing::{debug, warn};

use super::SourceError;
use crate::vad::frame::Frame;

const AUDIO_L16: &str = "audio/L16";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct L16Format {
    pub rate: u32,
    pub channels: u16,
    /// Samples per channel per frame.
    pub frame_size: usize,
}

impl L16Format {
    /// Parse a content-type header. The primary type must be
    /// `audio/L16` and the parameter set exactly
    /// `{rate, channels, frame_size}`.
    pub fn parse(content_type: &str) -> Result<Self, SourceError> {
        let reject = || SourceError::UnsupportedContentType(content_type.to_string());

        let mut parts = content_type.split(';').map(str::trim);
        let primary = parts.next().unwrap_or_default();
        if !primary.eq_ignore_ascii_case(AUDIO_L16) {
            return Err(reject());
        }

        let mut rate = None;
        let mut channels = None;
        let mut frame_size = None;
        for parameter in parts {
            let (key, value) = parameter.split_once('=').ok_or_else(reject)?;
            let value = value.trim();
            match key.trim() {
                "rate" => rate = value.parse::<u32>().ok(),
                "channels" => channels = value.parse::<u16>().ok(),
                "frame_size" => frame_size = value.parse::<usize>().ok(),
                _ => return Err(reject()),
            }
        }

        match (rate, channels, frame_size) {
            (Some(rate), Some(channels), Some(frame_size)) if channels > 0 => Ok(Self {
                rate,
                channels,
                frame_size,
            }),
            _ => Err(reject()),
        }
    }

    /// Render the content type the way the mic frontend advertises it.
    pub fn content_type(&self) -> String {
        format!(
            "{}; rate={}; channels={}; frame_size={}",
            AUDIO_L16, self.rate, self.channels, self.frame_size
        )
    }

    /// Wire size of one frame: two bytes per sample, all channels.
    pub fn frame_bytes(&self) -> usize {
        self.frame_size * self.channels as usize * 2
    }

    pub fn frame_duration_ms(&self) -> u32 {
        if self.rate == 0 {
            return 0;
        }
        (1000 * self.frame_size as u64 / self.rate as u64) as u32
    }
}

/// Chunks any byte reader into frames of the given format.
///
/// The stream ends at EOF; a truncated trailing chunk is dropped, and
/// read errors terminate the stream after a warning (termination is
/// the only error signal a frame stream carries).
pub struct L16FrameReader<R> {
    reader: R,
    format: L16Format,
    done: bool,
}

impl<R: Read> L16FrameReader<R> {
    pub fn new(reader: R, format: L16Format) -> Self {
        Self {
            reader,
            format,
            done: false,
        }
    }

    pub fn format(&self) -> L16Format {
        self.format
    }
}

impl<R: Read> Iterator for L16FrameReader<R> {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        if self.done {
            return None;
        }

        let mut buf = vec![0u8; self.format.frame_bytes()];
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("Frame stream read failed: {}", e);
                    self.done = true;
                    return None;
                }
            }
        }

        if filled < buf.len() {
            self.done = true;
            if filled > 0 {
                debug!("Dropped truncated trailing chunk of {} bytes", filled);
            }
            return None;
        }

        Some(Frame::from_le_bytes(
            &buf,
            self.format.rate,
            self.format.channels,
        ))
    }
}

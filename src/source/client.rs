//! Blocking HTTP frame source. Only ever used from blocking contexts
//! (driver workers, `spawn_blocking` handlers).

use reqwest::blocking::{Client, Response};
use reqwest::header;
use tracing::debug;

use super::l16::{L16FrameReader, L16Format};
use super::{FrameSource, SourceError, SourceLoader};
use crate::vad::frame::Frame;

pub struct HttpSourceLoader {
    client: Client,
}

impl HttpSourceLoader {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

impl Default for HttpSourceLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceLoader for HttpSourceLoader {
    /// Open the stream at `url`, resuming `offset` bytes into the
    /// signal via a range request. Live sources that ignore ranges
    /// simply serve from their current position.
    fn open(&self, url: &str, offset: u64) -> Result<Box<dyn FrameSource>, SourceError> {
        let mut request = self.client.get(url);
        if offset > 0 {
            request = request.header(header::RANGE, format!("bytes={}-", offset));
        }

        let response = request.send()?.error_for_status()?;

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .ok_or(SourceError::MissingContentType)?
            .to_string();
        let format = L16Format::parse(&content_type)?;

        debug!("Listening to {} ({})", url, content_type);

        Ok(Box::new(HttpAudioSource {
            frames: L16FrameReader::new(response, format),
        }))
    }
}

pub struct HttpAudioSource {
    frames: L16FrameReader<Response>,
}

impl Iterator for HttpAudioSource {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        self.frames.next()
    }
}

impl FrameSource for HttpAudioSource {
    fn format(&self) -> L16Format {
        self.frames.format()
    }
}

//! Debug persistence of the raw frames consumed during an invocation.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use hound::{SampleFormat, WavSpec, WavWriter};
use tracing::debug;

use super::frame::Frame;

/// Write the frames to `<dir>/vad-<timestamp>-<offset>.wav` as 16-bit
/// PCM and return the path. Empty input writes nothing.
pub fn store_frames(frames: &[Frame], dir: &Path, offset: i64) -> Result<Option<PathBuf>, hound::Error> {
    let Some(first) = frames.first() else {
        return Ok(None);
    };

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default();
    let path = dir.join(format!("vad-{}-{}.wav", timestamp, offset));

    let spec = WavSpec {
        channels: first.channels(),
        sample_rate: first.rate(),
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(&path, spec)?;
    for frame in frames {
        for &sample in frame.samples() {
            writer.write_sample(sample)?;
        }
    }
    writer.finalize()?;

    debug!("Stored {} frames to {}", frames.len(), path.display());

    Ok(Some(path))
}

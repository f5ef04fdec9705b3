use std::borrow::Cow;

/// A fixed-duration block of interleaved signed 16-bit PCM samples.
///
/// Frames are the atomic unit of time in the pipeline: offsets and
/// timeouts are counted in frames relative to the start of an
/// invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    samples: Vec<i16>,
    rate: u32,
    channels: u16,
}

impl Frame {
    pub fn new(samples: Vec<i16>, rate: u32, channels: u16) -> Self {
        Self {
            samples,
            rate,
            channels: channels.max(1),
        }
    }

    /// Decode a little-endian byte buffer as interleaved int16 samples.
    /// A trailing odd byte is ignored.
    pub fn from_le_bytes(bytes: &[u8], rate: u32, channels: u16) -> Self {
        let samples = bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Self::new(samples, rate, channels)
    }

    pub fn rate(&self) -> u32 {
        self.rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Samples per channel, i.e. the frame length on the time axis.
    pub fn samples_per_channel(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    /// Frame duration in milliseconds, derived from rate and length.
    pub fn duration_ms(&self) -> u32 {
        if self.rate == 0 {
            return 0;
        }
        (1000 * self.samples_per_channel() as u64 / self.rate as u64) as u32
    }

    pub fn byte_len(&self) -> usize {
        self.samples.len() * 2
    }

    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.byte_len());
        for sample in &self.samples {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        bytes
    }

    /// Mix interleaved channels down to mono using the integer mean.
    ///
    /// Mono frames are returned as-is without copying. The truncating
    /// integer division keeps the result bit-exact across runs.
    pub fn mono_samples(&self) -> Cow<'_, [i16]> {
        if self.channels == 1 {
            return Cow::Borrowed(&self.samples);
        }

        let channels = self.channels as usize;
        let mono = self
            .samples
            .chunks_exact(channels)
            .map(|group| {
                let sum: i32 = group.iter().map(|&s| s as i32).sum();
                (sum / channels as i32) as i16
            })
            .collect();
        Cow::Owned(mono)
    }
}

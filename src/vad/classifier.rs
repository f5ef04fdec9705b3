use webrtc_vad::{SampleRate, Vad, VadMode};

use super::frame::Frame;
use super::VadError;

/// The single sampling rate the reference classifier accepts.
pub const SUPPORTED_RATE: u32 = 16000;

const FRAME_DURATIONS_MS: [u32; 3] = [10, 20, 30];

/// Per-frame voice oracle: maps one PCM frame to voice / non-voice.
///
/// Implementations take `&mut self` because the underlying detectors
/// keep internal filter state, but the answer for a given frame must
/// not depend on call order.
pub trait VoiceClassifier {
    fn is_voice(&mut self, frame: &Frame) -> Result<bool, VadError>;
}

/// WebRTC aggressiveness-mode classifier.
///
/// Validates frame shape before classification and mixes multi-channel
/// frames down to mono; the underlying oracle only ever sees mono
/// int16 at 16kHz.
pub struct WebRtcClassifier {
    vad: Vad,
}

impl WebRtcClassifier {
    pub fn new(mode: VadMode) -> Self {
        Self {
            vad: Vad::new_with_rate_and_mode(SampleRate::Rate16kHz, mode),
        }
    }

    fn validate(frame: &Frame) -> Result<(), VadError> {
        if frame.samples().len() % frame.channels() as usize != 0 {
            return Err(VadError::InvalidSampleFormat(format!(
                "{} samples do not divide into {} channels",
                frame.samples().len(),
                frame.channels()
            )));
        }

        if frame.rate() != SUPPORTED_RATE {
            return Err(VadError::UnsupportedRate(frame.rate()));
        }

        if !FRAME_DURATIONS_MS.contains(&frame.duration_ms()) {
            return Err(VadError::InvalidFrameDuration(frame.duration_ms()));
        }

        Ok(())
    }
}

impl VoiceClassifier for WebRtcClassifier {
    fn is_voice(&mut self, frame: &Frame) -> Result<bool, VadError> {
        Self::validate(frame)?;

        let mono = frame.mono_samples();
        self.vad
            .is_voice_segment(&mono)
            .map_err(|_| VadError::InvalidFrameDuration(frame.duration_ms()))
    }
}

/// Map the 0..=3 aggressiveness value used in configuration to the
/// WebRTC mode, clamping out-of-range values to the most aggressive.
pub fn mode_from_aggressiveness(mode: u8) -> VadMode {
    match mode {
        0 => VadMode::Quality,
        1 => VadMode::LowBitrate,
        2 => VadMode::Aggressive,
        _ => VadMode::VeryAggressive,
    }
}

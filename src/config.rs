//! TOML-backed settings. Every field has a default so an absent file
//! or a partial one is fine.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;
use webrtc_vad::VadMode;

use crate::vad::classifier::mode_from_aggressiveness;
use crate::vad::segmenter::SegmenterConfig;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub vad: VadSettings,
    pub gate: GateSettings,
    pub server: ServerSettings,
    pub topics: TopicSettings,
}

impl Settings {
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read settings from {}", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("failed to parse settings from {}", path.display()))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VadSettings {
    pub activity_window_ms: u32,
    pub activity_threshold: f32,
    pub allow_gap_ms: u32,
    pub padding_ms: u32,
    pub min_duration_ms: u32,
    /// Timeout for event-driven detection; 0 disables.
    pub timeout_s: u32,
    /// WebRTC aggressiveness, 0 (quality) to 3 (very aggressive).
    pub mode: u8,
    /// Directory for debug WAV dumps of consumed audio.
    pub storage: Option<PathBuf>,
}

impl Default for VadSettings {
    fn default() -> Self {
        Self {
            activity_window_ms: 300,
            activity_threshold: 0.9,
            allow_gap_ms: 300,
            padding_ms: 300,
            min_duration_ms: 500,
            timeout_s: 0,
            mode: 2,
            storage: None,
        }
    }
}

impl VadSettings {
    pub fn segmenter_config(&self) -> SegmenterConfig {
        SegmenterConfig {
            activity_window_ms: self.activity_window_ms,
            activity_threshold: self.activity_threshold,
            allow_gap_ms: self.allow_gap_ms,
            padding_ms: self.padding_ms,
            min_duration_ms: self.min_duration_ms,
            timeout_s: self.timeout_s,
            storage: self.storage.clone(),
        }
    }

    pub fn classifier_mode(&self) -> VadMode {
        mode_from_aggressiveness(self.mode)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GateSettings {
    /// Pre- and post-roll of the gated detector, in frames.
    pub padding_frames: usize,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self { padding_frames: 10 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Timeout applied to one /listen invocation.
    pub listen_timeout_s: u32,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            listen_timeout_s: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TopicSettings {
    pub mic: String,
    pub vad: String,
    pub control: String,
}

impl Default for TopicSettings {
    fn default() -> Self {
        Self {
            mic: "voicegate.mic".to_string(),
            vad: "voicegate.vad".to_string(),
            control: "voicegate.vad.control".to_string(),
        }
    }
}

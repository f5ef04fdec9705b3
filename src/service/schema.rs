//! Wire shapes published on the VAD topic.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Activation annotation: how voiced the segment is, which detector
/// said so, and when.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VadAnnotation {
    pub value: f32,
    pub source: String,
    pub timestamp: u64,
}

impl VadAnnotation {
    pub fn for_activation(value: f32, source: &str) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or_default();

        Self {
            value: value.clamp(0.0, 1.0),
            source: source.to_string(),
            timestamp,
        }
    }
}

/// Byte range of a segment inside the signal it was cut from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalRange {
    pub signal_id: String,
    pub start: u64,
    pub stop: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VadMention {
    pub id: String,
    pub segment: SignalRange,
    pub annotation: VadAnnotation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct VadMentionEvent {
    pub mentions: Vec<VadMention>,
}

impl VadMentionEvent {
    pub fn create(segment: SignalRange, annotation: VadAnnotation) -> Self {
        Self {
            mentions: vec![VadMention {
                id: Uuid::new_v4().to_string(),
                segment,
                annotation,
            }],
        }
    }
}

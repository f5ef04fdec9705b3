//! In-process topic bus carrying the audio-signal lifecycle and the
//! VAD output events.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

use crate::service::schema::VadMentionEvent;

const TOPIC_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct Event {
    pub id: String,
    pub payload: Payload,
}

impl Event {
    pub fn for_payload(payload: Payload) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            payload,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Payload {
    /// An upstream audio signal became available at a URL.
    AudioSignalStarted { signal_id: String, url: String },
    /// The signal's capture ended; its stream will exhaust.
    AudioSignalStopped { signal_id: String },
    /// A detected segment, published as its byte range in the signal.
    VadMention(VadMentionEvent),
    /// Gating control for the gated detector variant.
    VadControl { active: bool },
}

/// Topic-keyed broadcast channels. Senders live for the lifetime of
/// the bus, so subscribers only ever observe lag, not closure.
#[derive(Debug, Default)]
pub struct EventBus {
    topics: Mutex<HashMap<String, broadcast::Sender<Event>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<Event> {
        let mut topics = self.topics.lock().unwrap_or_else(|e| e.into_inner());
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .clone()
    }

    pub fn publish(&self, topic: &str, event: Event) {
        if self.sender(topic).send(event).is_err() {
            trace!("No subscribers on topic {}", topic);
        }
    }

    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<Event> {
        self.sender(topic).subscribe()
    }
}

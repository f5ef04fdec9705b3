//! The topic worker around the segmentation engine: one blocking
//! driver per audio signal, publishing each detected segment as a
//! byte-range mention on the VAD topic.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::event::{Event, EventBus, Payload};
use crate::source::SourceLoader;
use crate::vad::gate::VadGate;
use crate::vad::{SpeechDetector, VadError};

use super::schema::{SignalRange, VadAnnotation, VadMentionEvent};

/// Builds one detector per audio signal. Detectors are constructed
/// inside the signal's worker, so they need not be Send themselves.
pub type DetectorFactory = dyn Fn() -> Box<dyn SpeechDetector> + Send + Sync;

pub struct VadService {
    mic_topic: String,
    vad_topic: String,
    control_topic: Option<String>,
    detector_name: String,
    bus: Arc<EventBus>,
    loader: Arc<dyn SourceLoader>,
    factory: Arc<DetectorFactory>,
    gate: Option<VadGate>,
    stopped: Arc<AtomicBool>,
    tasks: HashMap<String, JoinHandle<()>>,
}

impl VadService {
    pub fn new(
        mic_topic: impl Into<String>,
        vad_topic: impl Into<String>,
        detector_name: impl Into<String>,
        bus: Arc<EventBus>,
        loader: Arc<dyn SourceLoader>,
        factory: Arc<DetectorFactory>,
    ) -> Self {
        Self {
            mic_topic: mic_topic.into(),
            vad_topic: vad_topic.into(),
            control_topic: None,
            detector_name: detector_name.into(),
            bus,
            loader,
            factory,
            gate: None,
            stopped: Arc::new(AtomicBool::new(false)),
            tasks: HashMap::new(),
        }
    }

    /// Subscribe to a control topic whose events toggle the gate of a
    /// gated detector.
    pub fn with_gate(mut self, control_topic: impl Into<String>, gate: VadGate) -> Self {
        self.control_topic = Some(control_topic.into());
        self.gate = Some(gate);
        self
    }

    /// Setting the returned flag winds signal workers down between
    /// driver iterations; a segment in progress is never cut short.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stopped.clone()
    }

    pub async fn run(mut self) {
        let mut mic_rx = self.bus.subscribe(&self.mic_topic);

        // A dummy channel stands in when no control topic is
        // configured, keeping the select below a fixed shape. The
        // sender is held so the receiver never reports closure.
        let (_control_keepalive, mut control_rx) = match &self.control_topic {
            Some(topic) => (None, self.bus.subscribe(topic)),
            None => {
                let (tx, rx) = broadcast::channel(1);
                (Some(tx), rx)
            }
        };

        info!("VAD service listening on topic '{}'", self.mic_topic);

        loop {
            let event = tokio::select! {
                event = mic_rx.recv() => event,
                event = control_rx.recv() => event,
            };

            match event {
                Ok(event) => self.handle(event).await,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("VAD service lagged, skipped {} events", missed);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    async fn handle(&mut self, event: Event) {
        match event.payload {
            Payload::AudioSignalStarted { signal_id, url } => {
                // At most one driver per signal; a second start while
                // one is active is a programmer error upstream.
                if self.tasks.contains_key(&signal_id) {
                    error!("Ignored start of signal {} with a detection already running", signal_id);
                    return;
                }

                debug!("Started VAD task {} for signal {}", event.id, signal_id);

                let worker = SignalWorker {
                    signal_id: signal_id.clone(),
                    url,
                    loader: self.loader.clone(),
                    factory: self.factory.clone(),
                    bus: self.bus.clone(),
                    vad_topic: self.vad_topic.clone(),
                    detector_name: self.detector_name.clone(),
                    stopped: self.stopped.clone(),
                };
                let handle = tokio::task::spawn_blocking(move || worker.run());
                self.tasks.insert(signal_id, handle);
            }
            Payload::AudioSignalStopped { signal_id } => match self.tasks.remove(&signal_id) {
                None => error!("Received stop without running VAD for signal {}", signal_id),
                Some(handle) => {
                    if let Err(e) = handle.await {
                        error!("VAD task for signal {} failed: {}", signal_id, e);
                    }
                    debug!("Finished VAD task for signal {}", signal_id);
                }
            },
            Payload::VadControl { active } => match &self.gate {
                Some(gate) => gate.set_active(active),
                None => debug!("Ignored gate control without a gated detector"),
            },
            Payload::VadMention(_) => {}
        }
    }
}

struct SignalWorker {
    signal_id: String,
    url: String,
    loader: Arc<dyn SourceLoader>,
    factory: Arc<DetectorFactory>,
    bus: Arc<EventBus>,
    vad_topic: String,
    detector_name: String,
    stopped: Arc<AtomicBool>,
}

impl SignalWorker {
    /// One segment per iteration until the source exhausts or the
    /// service stops. Cancellation is only observed between
    /// iterations, never mid-segment.
    fn run(self) {
        let mut detector = (self.factory)();
        let mut source_offset: u64 = 0;

        while !self.stopped.load(Ordering::Acquire) {
            let mut source = match self.loader.open(&self.url, source_offset) {
                Ok(source) => source,
                Err(e) => {
                    error!("Failed to open {} for signal {}: {}", self.url, self.signal_id, e);
                    break;
                }
            };
            let frame_bytes = source.format().frame_bytes() as u64;

            match detector.next_segment(&mut source) {
                Ok(segment) => {
                    if segment.consumed == 0 {
                        debug!("Source exhausted for signal {}", self.signal_id);
                        break;
                    }

                    if !segment.is_empty() {
                        let start = source_offset + segment.offset as u64 * frame_bytes;
                        let stop = start + segment.byte_len() as u64;
                        debug!(
                            "Publishing mention [{}, {}) for signal {} (offset {}, consumed {})",
                            start, stop, self.signal_id, segment.offset, segment.consumed
                        );

                        let mention = VadMentionEvent::create(
                            SignalRange {
                                signal_id: self.signal_id.clone(),
                                start,
                                stop,
                            },
                            VadAnnotation::for_activation(1.0, &self.detector_name),
                        );
                        self.bus
                            .publish(&self.vad_topic, Event::for_payload(Payload::VadMention(mention)));
                    }

                    source_offset += segment.consumed as u64 * frame_bytes;
                }
                // No voice before the timeout is not fatal here: skip
                // the consumed bytes and keep listening.
                Err(VadError::Timeout { consumed, .. }) => {
                    debug!(
                        "No VA within timeout for signal {} ({} frames)",
                        self.signal_id, consumed
                    );
                    if consumed == 0 {
                        break;
                    }
                    source_offset += consumed as u64 * frame_bytes;
                }
                Err(e) => {
                    error!("VAD failed for signal {}: {}", self.signal_id, e);
                    break;
                }
            }
        }
    }
}

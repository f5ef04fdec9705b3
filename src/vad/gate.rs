//! Externally gated detection: instead of the activity window, an
//! atomic flag flipped by a controller decides when speech ends.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use super::classifier::VoiceClassifier;
use super::frame::Frame;
use super::segment::Segment;
use super::{SpeechDetector, VadError};

/// Shared handle on the gate flag. The only writer is the control
/// surface (HTTP endpoint or control topic); the only reader is the
/// detection loop.
#[derive(Debug, Clone, Default)]
pub struct VadGate {
    active: Arc<AtomicBool>,
}

impl VadGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
        debug!("VA gate set {}", if active { "active" } else { "inactive" });
    }
}

/// Gate-driven counterpart of the frame-wise segmenter.
///
/// Accumulation starts at the first frame that is both gate-active and
/// classifier-voiced, and ends when the gate clears; gap tolerance and
/// minimum duration do not apply. The output shape is identical to the
/// frame-wise segmenter's.
pub struct GatedSegmenter<C> {
    gate: VadGate,
    classifier: C,
    padding: usize,
}

impl<C: VoiceClassifier> GatedSegmenter<C> {
    /// `padding` is counted in frames: that many are retained before
    /// the detected start and appended after the gate clears.
    pub fn new(gate: VadGate, classifier: C, padding: usize) -> Self {
        Self {
            gate,
            classifier,
            padding,
        }
    }

    pub fn gate(&self) -> &VadGate {
        &self.gate
    }

    pub fn detect<I>(&mut self, frames: I) -> Result<Segment, VadError>
    where
        I: IntoIterator<Item = Frame>,
    {
        let mut source = frames.into_iter();

        let mut ring: VecDeque<Frame> = VecDeque::with_capacity(self.padding + 1);
        let mut output: Vec<Frame> = Vec::new();
        let mut consumed: usize = 0;
        let offset: i64;

        // Wait for a gate-active voiced frame; everything before it is
        // pre-roll material at most.
        loop {
            let Some(frame) = source.next() else {
                debug!("No VA in gated audio of length {}", consumed);
                return Ok(Segment::empty(consumed));
            };
            let idx = consumed;
            consumed += 1;

            if self.gate.is_active() && self.classifier.is_voice(&frame)? {
                offset = (idx - ring.len()) as i64;
                debug!("Detected start of VA at offset {} ({} pre-roll frames)", offset, ring.len());
                output.extend(ring.drain(..));
                output.push(frame);
                break;
            }

            if self.padding > 0 {
                if ring.len() == self.padding {
                    ring.pop_front();
                }
                ring.push_back(frame);
            }
        }

        // Accumulate until the gate clears, then append up to
        // `padding` trailing frames starting with the one that
        // observed the cleared gate.
        loop {
            let Some(frame) = source.next() else {
                break;
            };
            consumed += 1;

            if self.gate.is_active() {
                output.push(frame);
                continue;
            }

            let mut trailing = frame;
            for taken in 0..self.padding {
                output.push(trailing);
                if taken + 1 == self.padding {
                    break;
                }
                match source.next() {
                    Some(next) => {
                        consumed += 1;
                        trailing = next;
                    }
                    None => break,
                }
            }
            break;
        }

        debug!("Detected VA of length {} with padding {}", output.len(), self.padding);

        Ok(Segment {
            frames: output,
            offset,
            consumed,
        })
    }
}

impl<C: VoiceClassifier> SpeechDetector for GatedSegmenter<C> {
    fn next_segment(
        &mut self,
        frames: &mut dyn Iterator<Item = Frame>,
    ) -> Result<Segment, VadError> {
        self.detect(frames)
    }
}

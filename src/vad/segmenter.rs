//! The segmentation state machine.
//!
//! One invocation of [`Segmenter::detect`] pulls frames from its
//! source until a complete speech segment is available or the source
//! ends. Three buffers keep memory bounded while searching: a ring of
//! pre-roll candidates, a gap buffer for tolerated intra-utterance
//! silence, and the output segment itself.

use std::collections::VecDeque;
use std::path::PathBuf;

use tracing::{debug, warn};

use super::classifier::VoiceClassifier;
use super::frame::Frame;
use super::segment::Segment;
use super::wav;
use super::window::ActivityWindow;
use super::{SpeechDetector, VadError};

#[derive(Debug, Clone)]
pub struct SegmenterConfig {
    /// Width of the activity window in milliseconds; the frame window
    /// W is derived from it at the source's frame duration.
    pub activity_window_ms: u32,
    /// Minimum activity ratio to treat a frame as voice-present.
    pub activity_threshold: f32,
    /// Maximum tolerated silence inside an utterance.
    pub allow_gap_ms: u32,
    /// Pre-roll retained before speech start and post-roll appended
    /// after speech end.
    pub padding_ms: u32,
    /// Candidates with less voiced time than this are discarded and
    /// detection resumes.
    pub min_duration_ms: u32,
    /// Maximum time before the first voiced frame; 0 disables.
    pub timeout_s: u32,
    /// When set, every frame consumed during an invocation is written
    /// to a WAV file in this directory.
    pub storage: Option<PathBuf>,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            activity_window_ms: 300,
            activity_threshold: 0.9,
            allow_gap_ms: 300,
            padding_ms: 300,
            min_duration_ms: 500,
            timeout_s: 0,
            storage: None,
        }
    }
}

enum Phase {
    Searching,
    Speech,
    Gap,
}

pub struct Segmenter<C> {
    config: SegmenterConfig,
    classifier: C,
}

impl<C: VoiceClassifier> Segmenter<C> {
    pub fn new(config: SegmenterConfig, classifier: C) -> Self {
        Self { config, classifier }
    }

    pub fn config(&self) -> &SegmenterConfig {
        &self.config
    }

    /// Consume frames until one speech segment is complete or the
    /// source is exhausted.
    ///
    /// Returns the empty segment (`offset == -1`) when the source ends
    /// without a detection, and `Timeout` when no voiced frame arrives
    /// within the configured limit.
    pub fn detect<I>(&mut self, frames: I) -> Result<Segment, VadError>
    where
        I: IntoIterator<Item = Frame>,
    {
        let mut upstream = frames.into_iter();
        let Some(first) = upstream.next() else {
            return Ok(Segment::empty(0));
        };

        let frame_ms = first.duration_ms();
        if frame_ms == 0 {
            return Err(VadError::InvalidFrameDuration(0));
        }

        let window_size = ((self.config.activity_window_ms / frame_ms) as usize).max(1);
        let padding = (self.config.padding_ms / frame_ms) as usize;
        let ring_cap = padding + window_size - 1;
        let timeout_frames = self.config.timeout_s as u64 * 1000 / frame_ms as u64;

        debug!(
            "Started detection with window of {} and padding of {} frames ({}ms frame duration)",
            window_size, padding, frame_ms
        );

        let mut source = std::iter::once(first).chain(upstream);
        let mut window = ActivityWindow::new(window_size);

        let mut ring: VecDeque<Frame> = VecDeque::with_capacity(ring_cap + 1);
        let mut gap: Vec<Frame> = Vec::new();
        let mut output: Vec<Frame> = Vec::new();
        let mut record: Vec<Frame> = Vec::new();

        let mut phase = Phase::Searching;
        let mut offset: i64 = -1;
        let mut voiced_len: u64 = 0;
        let mut consumed: usize = 0;
        let mut closed = false;
        // The frame whose silence run ended the candidate; it becomes
        // the first trailing-padding frame so the segment stays
        // contiguous.
        let mut close_frame: Option<Frame> = None;

        while let Some(frame) = source.next() {
            let idx = consumed;
            consumed += 1;
            if self.config.storage.is_some() {
                record.push(frame.clone());
            }

            // The timeout clock only runs before the first detection;
            // warm-up frames count toward it.
            if matches!(phase, Phase::Searching)
                && self.config.timeout_s > 0
                && idx as u64 > timeout_frames
            {
                return Err(VadError::Timeout {
                    seconds: self.config.timeout_s,
                    consumed,
                });
            }

            let voiced = self.classifier.is_voice(&frame)?;
            let activity = window.observe(voiced);
            let speech = activity.is_some_and(|a| a >= self.config.activity_threshold);

            match phase {
                Phase::Searching => {
                    if speech {
                        // Pre-roll is the newest `padding` frames of
                        // the ring, keeping the segment contiguous.
                        let keep = padding.min(ring.len());
                        let skip = ring.len() - keep;
                        output.extend(ring.drain(..).skip(skip));
                        offset = (idx - keep) as i64;
                        output.push(frame);
                        voiced_len = 1;
                        phase = Phase::Speech;
                        debug!(
                            "Detected start of speech at frame {}, offset {} ({} pre-roll frames)",
                            idx, offset, keep
                        );
                    } else if ring_cap > 0 {
                        if ring.len() == ring_cap {
                            ring.pop_front();
                        }
                        ring.push_back(frame);
                    }
                }
                Phase::Speech | Phase::Gap => {
                    if speech {
                        if !gap.is_empty() {
                            debug!("Absorbed gap of {} frames at {}", gap.len(), idx);
                            output.append(&mut gap);
                        }
                        output.push(frame);
                        voiced_len += 1;
                        phase = Phase::Speech;
                    } else if gap.len() as u64 * frame_ms as u64 > self.config.allow_gap_ms as u64 {
                        if voiced_len * frame_ms as u64 >= self.config.min_duration_ms as u64 {
                            debug!("Detected end of speech at frame {}", idx);
                            closed = true;
                            close_frame = Some(frame);
                            break;
                        }

                        // Candidate too short: drop it, pre-roll
                        // included, and resume searching from here.
                        debug!("Discarded short candidate of {} voiced frames at {}", voiced_len, idx);
                        output.clear();
                        gap.clear();
                        voiced_len = 0;
                        offset = -1;
                        phase = Phase::Searching;
                        if ring_cap > 0 {
                            ring.push_back(frame);
                        }
                    } else {
                        gap.push(frame);
                        phase = Phase::Gap;
                    }
                }
            }
        }

        // The source ran out with a candidate still open: it is only a
        // segment if it meets the minimum voiced duration.
        if !closed
            && !output.is_empty()
            && voiced_len * (frame_ms as u64) < self.config.min_duration_ms as u64
        {
            debug!("Dropped short candidate of {} voiced frames at end of audio", voiced_len);
            output.clear();
            gap.clear();
            offset = -1;
        }

        if !output.is_empty() {
            // Trailing padding, up to `padding` frames in total: the
            // pending gap is flushed into the segment first, then the
            // frame that closed the candidate, then frames pulled raw
            // from the source.
            let flush = padding.min(gap.len());
            output.extend(gap.drain(..flush));
            let mut remaining = padding - flush;
            if remaining > 0 {
                if let Some(frame) = close_frame.take() {
                    output.push(frame);
                    remaining -= 1;
                }
            }
            for _ in 0..remaining {
                match source.next() {
                    Some(frame) => {
                        consumed += 1;
                        if self.config.storage.is_some() {
                            record.push(frame.clone());
                        }
                        output.push(frame);
                    }
                    None => {
                        debug!("Reached end of audio at {}", consumed);
                        break;
                    }
                }
            }
        }

        if let Some(dir) = &self.config.storage {
            if let Err(e) = wav::store_frames(&record, dir, offset) {
                warn!("Failed to store invocation audio: {}", e);
            }
        }

        if output.is_empty() {
            Ok(Segment::empty(consumed))
        } else {
            debug!("Detected speech of {} frames at offset {}", output.len(), offset);
            Ok(Segment {
                frames: output,
                offset,
                consumed,
            })
        }
    }
}

impl<C: VoiceClassifier> SpeechDetector for Segmenter<C> {
    fn next_segment(
        &mut self,
        frames: &mut dyn Iterator<Item = Frame>,
    ) -> Result<Segment, VadError> {
        self.detect(frames)
    }
}

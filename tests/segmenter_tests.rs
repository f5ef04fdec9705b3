use voicegate::vad::classifier::VoiceClassifier;
use voicegate::vad::frame::Frame;
use voicegate::vad::segmenter::{Segmenter, SegmenterConfig};
use voicegate::vad::VadError;

const RATE: u32 = 16000;
const FRAME_MS: u32 = 30;
const FRAME_LEN: usize = (RATE as usize * FRAME_MS as usize) / 1000;

/// Deterministic oracle: a frame is voiced iff its peak sample is 1.
struct PeakClassifier;

impl VoiceClassifier for PeakClassifier {
    fn is_voice(&mut self, frame: &Frame) -> Result<bool, VadError> {
        Ok(frame.samples().iter().copied().max().unwrap_or(0) == 1)
    }
}

fn silence() -> Frame {
    Frame::new(vec![0i16; FRAME_LEN], RATE, 1)
}

fn voice() -> Frame {
    Frame::new(vec![1i16; FRAME_LEN], RATE, 1)
}

/// Build a stream from (count, voiced) runs.
fn stream(runs: &[(usize, bool)]) -> Vec<Frame> {
    let mut frames = Vec::new();
    for &(count, voiced) in runs {
        for _ in 0..count {
            frames.push(if voiced { voice() } else { silence() });
        }
    }
    frames
}

fn config(padding_frames: u32, allow_gap_frames: u32, min_duration_frames: u32) -> SegmenterConfig {
    SegmenterConfig {
        activity_window_ms: FRAME_MS, // W = 1
        activity_threshold: 1.0,
        allow_gap_ms: allow_gap_frames * FRAME_MS,
        padding_ms: padding_frames * FRAME_MS,
        min_duration_ms: min_duration_frames * FRAME_MS,
        timeout_s: 0,
        storage: None,
    }
}

#[test]
fn test_empty_input() {
    let mut segmenter = Segmenter::new(config(3, 0, 0), PeakClassifier);
    let segment = segmenter.detect(Vec::new()).unwrap();

    assert!(segment.is_empty());
    assert_eq!(-1, segment.offset);
    assert_eq!(0, segment.consumed);
}

#[test]
fn test_silence_only() {
    let mut segmenter = Segmenter::new(config(3, 0, 0), PeakClassifier);
    let segment = segmenter.detect(stream(&[(10, false)])).unwrap();

    assert!(segment.is_empty());
    assert_eq!(-1, segment.offset);
    assert_eq!(10, segment.consumed);
}

#[test]
fn test_detect_with_padding() {
    let mut segmenter = Segmenter::new(config(3, 0, 0), PeakClassifier);
    let segment = segmenter
        .detect(stream(&[(10, false), (10, true), (30, false)]))
        .unwrap();

    // 3 frames of pre-roll, 10 voiced, 3 trailing.
    assert_eq!(7, segment.offset);
    assert_eq!(16, segment.frames.len());
    assert!(segment.consumed >= 23, "consumed {}", segment.consumed);
    assert!(segment.offset as usize + segment.frames.len() <= segment.consumed);
}

#[test]
fn test_detect_without_padding() {
    let mut segmenter = Segmenter::new(config(0, 0, 0), PeakClassifier);
    let segment = segmenter
        .detect(stream(&[(10, false), (10, true), (30, false)]))
        .unwrap();

    assert_eq!(10, segment.offset);
    assert_eq!(10, segment.frames.len());
    assert!(segment.consumed >= 20, "consumed {}", segment.consumed);
    assert!(segment.frames.iter().all(|f| f.samples()[0] == 1));
}

#[test]
fn test_detect_voice_at_start() {
    let mut segmenter = Segmenter::new(config(0, 0, 0), PeakClassifier);
    let segment = segmenter
        .detect(stream(&[(10, true), (30, false)]))
        .unwrap();

    assert_eq!(0, segment.offset);
    assert_eq!(10, segment.frames.len());
    assert!(segment.consumed >= 10);
}

#[test]
fn test_padding_exceeds_leading_silence() {
    let mut segmenter = Segmenter::new(config(10, 0, 0), PeakClassifier);
    let segment = segmenter
        .detect(stream(&[(5, false), (10, true), (30, false)]))
        .unwrap();

    // Only 5 frames exist before the speech; all of them are kept,
    // and 10 trailing frames are appended.
    assert_eq!(0, segment.offset);
    assert_eq!(25, segment.frames.len());
    assert!(segment.consumed >= 25, "consumed {}", segment.consumed);
}

#[test]
fn test_gap_is_absorbed() {
    let mut segmenter = Segmenter::new(config(0, 5, 0), PeakClassifier);
    let segment = segmenter
        .detect(stream(&[(3, true), (3, false), (3, true), (20, false)]))
        .unwrap();

    // The 3-frame silence run sits under the 5-frame tolerance and
    // becomes part of the utterance.
    assert_eq!(0, segment.offset);
    assert_eq!(9, segment.frames.len());
}

#[test]
fn test_gap_closes_segment() {
    let mut segmenter = Segmenter::new(config(0, 2, 0), PeakClassifier);
    let segment = segmenter
        .detect(stream(&[(5, true), (10, false), (5, true), (10, false)]))
        .unwrap();

    // The silence run exceeds the tolerance, so only the first voiced
    // run is emitted.
    assert_eq!(0, segment.offset);
    assert_eq!(5, segment.frames.len());
}

#[test]
fn test_trailing_padding_is_contiguous() {
    let mut segmenter = Segmenter::new(config(3, 0, 0), PeakClassifier);
    let mut input = stream(&[(10, false), (10, true), (30, false)]);
    // Stamp each frame with its negated index so the ordering is
    // observable without disturbing the peak-based classifier.
    for (idx, frame) in input.iter_mut().enumerate() {
        let mut samples = frame.samples().to_vec();
        samples[1] = -(idx as i16);
        *frame = Frame::new(samples, RATE, 1);
    }

    let segment = segmenter.detect(input).unwrap();

    let indices: Vec<i16> = segment.frames.iter().map(|f| -f.samples()[1]).collect();
    let expected: Vec<i16> = (7..23).collect();
    assert_eq!(expected, indices);
}

#[test]
fn test_min_duration_discards_short_candidate() {
    let mut segmenter = Segmenter::new(config(0, 0, 20), PeakClassifier);
    let segment = segmenter
        .detect(stream(&[
            (5, false),
            (10, true),
            (5, false),
            (25, true),
            (10, false),
        ]))
        .unwrap();

    // The first 10-frame run is below the 20-frame minimum and is
    // discarded; detection resumes and finds the 25-frame run.
    assert_eq!(20, segment.offset);
    assert_eq!(25, segment.frames.len());
}

#[test]
fn test_min_duration_longer_than_any_run() {
    let mut segmenter = Segmenter::new(config(0, 0, 20), PeakClassifier);
    let segment = segmenter
        .detect(stream(&[(5, false), (10, true), (30, false)]))
        .unwrap();

    assert!(segment.is_empty());
    assert_eq!(-1, segment.offset);
}

#[test]
fn test_min_duration_applies_at_end_of_audio() {
    let mut segmenter = Segmenter::new(config(0, 0, 20), PeakClassifier);
    let segment = segmenter.detect(stream(&[(10, true)])).unwrap();

    // The source ends mid-candidate; a too-short candidate still
    // yields nothing.
    assert!(segment.is_empty());
    assert_eq!(-1, segment.offset);
    assert_eq!(10, segment.consumed);
}

#[test]
fn test_exhaustion_mid_speech_emits_candidate() {
    let mut segmenter = Segmenter::new(config(0, 0, 0), PeakClassifier);
    let segment = segmenter.detect(stream(&[(2, false), (10, true)])).unwrap();

    assert_eq!(2, segment.offset);
    assert_eq!(10, segment.frames.len());
    assert_eq!(12, segment.consumed);
}

#[test]
fn test_gap_flush_capped_at_padding() {
    let mut segmenter = Segmenter::new(config(2, 5, 0), PeakClassifier);
    let segment = segmenter
        .detect(stream(&[(10, true), (20, false)]))
        .unwrap();

    // Six silence frames accumulate before the gap exceeds the
    // 5-frame tolerance; only 2 of them (the padding length) trail
    // the voiced run.
    assert_eq!(0, segment.offset);
    assert_eq!(12, segment.frames.len());
    assert_eq!(0, segment.frames[11].samples()[0]);
}

#[test]
fn test_timeout_without_voice() {
    let mut config = config(0, 0, 0);
    config.timeout_s = 1; // 33 frames at 30ms
    let mut segmenter = Segmenter::new(config, PeakClassifier);

    let result = segmenter.detect(stream(&[(40, false)]));

    match result {
        Err(VadError::Timeout { seconds, consumed }) => {
            assert_eq!(1, seconds);
            assert!(consumed > 33, "consumed {}", consumed);
        }
        other => panic!("expected timeout, got {:?}", other),
    }
}

#[test]
fn test_timeout_clock_stops_at_detection() {
    let mut config = config(0, 0, 0);
    config.timeout_s = 1;
    let mut segmenter = Segmenter::new(config, PeakClassifier);

    // Voice starts well before the 33-frame limit; the long tail after
    // it must not trip the timeout.
    let segment = segmenter
        .detect(stream(&[(5, false), (100, true), (10, false)]))
        .unwrap();

    assert_eq!(5, segment.offset);
    assert_eq!(100, segment.frames.len());
}

#[test]
fn test_warm_up_cannot_trigger_start() {
    // W = 5: the first 4 frames have undefined activity even though
    // every one of them classifies as voice.
    let mut config = config(0, 0, 0);
    config.activity_window_ms = 5 * FRAME_MS;
    let mut segmenter = Segmenter::new(config, PeakClassifier);

    let segment = segmenter.detect(stream(&[(20, true), (10, false)])).unwrap();

    assert_eq!(4, segment.offset);
    assert_eq!(16, segment.frames.len());
}

#[test]
fn test_warm_up_recovered_by_padding() {
    // With padding at least W - 1 the pre-roll reaches back over the
    // warm-up frames to the true start of voicing.
    let mut config = config(4, 0, 0);
    config.activity_window_ms = 5 * FRAME_MS;
    let mut segmenter = Segmenter::new(config, PeakClassifier);

    let segment = segmenter.detect(stream(&[(20, true), (10, false)])).unwrap();

    assert_eq!(0, segment.offset);
}

#[test]
fn test_runs_are_deterministic() {
    let input = stream(&[(7, false), (12, true), (4, false), (9, true), (20, false)]);

    let mut first = Segmenter::new(config(3, 2, 0), PeakClassifier);
    let mut second = Segmenter::new(config(3, 2, 0), PeakClassifier);

    let a = first.detect(input.clone()).unwrap();
    let b = second.detect(input).unwrap();

    assert_eq!(a, b);
}

#[test]
fn test_empty_segment_iff_negative_offset() {
    let inputs = [
        stream(&[(10, false)]),
        stream(&[(10, false), (10, true), (10, false)]),
        stream(&[(3, true)]),
        Vec::new(),
    ];

    for input in inputs {
        let mut segmenter = Segmenter::new(config(2, 1, 0), PeakClassifier);
        let segment = segmenter.detect(input).unwrap();

        assert_eq!(segment.is_empty(), segment.offset == -1);
        if segment.offset >= 0 {
            assert!(segment.offset as usize + segment.frames.len() <= segment.consumed);
        }
    }
}

#[test]
fn test_storage_writes_consumed_audio() {
    let dir = tempfile::tempdir().unwrap();

    let mut config = config(0, 0, 0);
    config.storage = Some(dir.path().to_path_buf());
    let mut segmenter = Segmenter::new(config, PeakClassifier);

    let segment = segmenter
        .detect(stream(&[(5, false), (5, true), (5, false)]))
        .unwrap();
    assert!(!segment.is_empty());

    let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(1, entries.len());

    let path = entries[0].as_ref().unwrap().path();
    let name = path.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("vad-") && name.ends_with(".wav"), "{}", name);

    let reader = hound::WavReader::open(&path).unwrap();
    assert_eq!(RATE, reader.spec().sample_rate);
    assert_eq!(segment.consumed * FRAME_LEN, reader.len() as usize);
}

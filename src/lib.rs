pub mod config;
pub mod event;
pub mod server;
pub mod service;
pub mod source;
pub mod vad;

// Re-export the segmentation core for convenient access
pub use vad::classifier::{VoiceClassifier, WebRtcClassifier};
pub use vad::frame::Frame;
pub use vad::segment::Segment;
pub use vad::segmenter::{Segmenter, SegmenterConfig};

use std::io::Write;

use voicegate::config::Settings;

#[test]
fn test_defaults_without_file() {
    let settings = Settings::load(None).unwrap();

    assert_eq!(300, settings.vad.activity_window_ms);
    assert_eq!(2, settings.vad.mode);
    assert_eq!(0, settings.vad.timeout_s);
    assert_eq!(8000, settings.server.port);
    assert_eq!(10, settings.server.listen_timeout_s);
    assert_eq!("voicegate.mic", settings.topics.mic);
}

#[test]
fn test_partial_file_keeps_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[vad]
activity_threshold = 0.5
allow_gap_ms = 120

[server]
port = 9000
"#
    )
    .unwrap();

    let settings = Settings::load(Some(file.path())).unwrap();

    assert_eq!(0.5, settings.vad.activity_threshold);
    assert_eq!(120, settings.vad.allow_gap_ms);
    assert_eq!(9000, settings.server.port);
    // Untouched sections and fields fall back to defaults.
    assert_eq!(300, settings.vad.padding_ms);
    assert_eq!("voicegate.vad", settings.topics.vad);
}

#[test]
fn test_segmenter_config_mapping() {
    let settings = Settings::load(None).unwrap();
    let config = settings.vad.segmenter_config();

    assert_eq!(settings.vad.activity_window_ms, config.activity_window_ms);
    assert_eq!(settings.vad.allow_gap_ms, config.allow_gap_ms);
    assert_eq!(settings.vad.padding_ms, config.padding_ms);
    assert_eq!(settings.vad.min_duration_ms, config.min_duration_ms);
    assert!(config.storage.is_none());
}

#[test]
fn test_missing_file_is_an_error() {
    let result = Settings::load(Some(std::path::Path::new("/nonexistent/voicegate.toml")));

    assert!(result.is_err());
}

//! Integration tests for logging and configuration loading

use core_runtime::loader::ConfigLoader;
use core_runtime::logging::{
    init_logging, redact_if_sensitive, redact_url, LogFormat, LogLevel, LoggingConfig,
};
use std::collections::HashMap;

#[test]
fn test_logging_initialization_once() {
    // Only one global subscriber per process
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Warn);

    assert!(init_logging(config.clone()).is_ok());
    assert!(init_logging(config).is_err());
}

#[test]
fn test_secret_redaction() {
    assert_eq!(redact_if_sensitive("access", "eyJhbGciOi"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("TMDB_API_KEY", "abc123"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("series_id", "42"), "42");
}

#[test]
fn test_stream_url_redaction() {
    let redacted = redact_url("http://legacy.example/series/bob/hunter2/77.mp4");
    assert!(!redacted.contains("hunter2"));
    assert!(redacted.ends_with("/77.mp4"));
}

#[test]
fn test_loader_log_settings_reach_config() {
    let mut vars = HashMap::new();
    vars.insert("DISPATCHARR_API_PASS".to_string(), "pw".to_string());
    vars.insert("LOG_LEVEL".to_string(), "trace".to_string());
    vars.insert("LOG_FORMAT".to_string(), "json".to_string());

    let config = ConfigLoader::from_vars(vars)
        .builder()
        .unwrap()
        .build()
        .unwrap();

    assert_eq!(config.log_level, LogLevel::Trace);
    assert_eq!(config.log_format, LogFormat::Json);
}

#[test]
fn test_loader_rejects_bad_log_format() {
    let mut vars = HashMap::new();
    vars.insert("DISPATCHARR_API_PASS".to_string(), "pw".to_string());
    vars.insert("LOG_FORMAT".to_string(), "yaml".to_string());

    assert!(ConfigLoader::from_vars(vars).builder().is_err());
}

/*!
 * Tests for app configuration functionality
 */

use tabtrans::app_config::{Config, LogLevel};

#[test]
fn test_default_config_shouldCarryDocumentedLimits() {
    let config = Config::default();

    assert_eq!(config.batch.max_tokens_per_batch, 89_900);
    assert_eq!(config.batch.max_tokens_per_request, 950);
    assert_eq!(config.batch.max_requests_per_file, 500);
    assert_eq!(config.jobs.poll_interval_secs, 30);
    assert_eq!(config.jobs.max_in_flight_jobs, 2);
    assert_eq!(config.jobs.retry_count, 3);
    assert_eq!(config.log_level, LogLevel::Info);
}

#[test]
fn test_default_config_shouldValidate() {
    let config = Config::default();
    assert!(config.validate().is_ok());
}

#[test]
fn test_validate_withEmptyLanguage_shouldFail() {
    let mut config = Config::default();
    config.target_language = "  ".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_withZeroBatchLimit_shouldFail() {
    let mut config = Config::default();
    config.batch.max_requests_per_file = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_withRequestLimitAboveBatchLimit_shouldFail() {
    let mut config = Config::default();
    config.batch.max_tokens_per_request = config.batch.max_tokens_per_batch + 1;
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_withZeroInFlightJobs_shouldFail() {
    let mut config = Config::default();
    config.jobs.max_in_flight_jobs = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_withMalformedEndpoint_shouldFail() {
    let mut config = Config::default();
    config.api.endpoint = "not a url".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_saveAndLoad_shouldRoundTrip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("conf.json");

    let mut config = Config::default();
    config.target_language = "Spanish".to_string();
    config.jobs.max_in_flight_jobs = 7;
    config.save_to_file(&path).expect("save config");

    let loaded = Config::from_file(&path).expect("load config");
    assert_eq!(loaded.target_language, "Spanish");
    assert_eq!(loaded.jobs.max_in_flight_jobs, 7);
    assert_eq!(loaded.batch.max_tokens_per_batch, 89_900);
}

#[test]
fn test_from_partial_json_shouldFillDefaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("conf.json");
    std::fs::write(&path, r#"{ "target_language": "French" }"#).expect("write config");

    let config = Config::from_file(&path).expect("load config");

    assert_eq!(config.target_language, "French");
    assert_eq!(config.api.model, "gpt-4o");
    assert_eq!(config.batch.max_requests_per_file, 500);
    assert_eq!(config.log_level, LogLevel::Info);
}

#[test]
fn test_log_level_shouldDeserializeLowercase() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("conf.json");
    std::fs::write(
        &path,
        r#"{ "target_language": "French", "log_level": "debug" }"#,
    )
    .expect("write config");

    let config = Config::from_file(&path).expect("load config");
    assert_eq!(config.log_level, LogLevel::Debug);
}

#[test]
fn test_has_api_key_shouldIgnoreWhitespace() {
    let mut config = Config::default();
    assert!(!config.has_api_key());

    config.api.api_key = "   ".to_string();
    assert!(!config.has_api_key());

    config.api.api_key = "sk-test".to_string();
    assert!(config.has_api_key());
}

use super::*;

use std::collections::HashMap;

fn settings_with(vars: &[(&str, &str)]) -> ClientSettings {
    let env: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    load_settings_from(|key| env.get(key).cloned())
}

#[test]
fn defaults_reproduce_baseline_behavior() {
    let settings = settings_with(&[]);
    assert_eq!(settings.compare_url, DEFAULT_COMPARE_URL);
    assert_eq!(settings.request_timeout, None);
    assert!(!settings.discard_stale_results);
    assert_eq!(settings.image_encoding, ImagePartEncoding::Binary);
}

#[test]
fn app_prefixed_url_wins_over_plain_variable() {
    let settings = settings_with(&[
        ("COMPARE_URL", "http://10.0.0.5:5000/compare"),
        ("APP__COMPARE_URL", "https://compare.internal/api/compare"),
    ]);
    assert_eq!(settings.compare_url, "https://compare.internal/api/compare");
}

#[test]
fn invalid_url_keeps_default() {
    let settings = settings_with(&[("COMPARE_URL", "localhost:5000/compare")]);
    assert_eq!(settings.compare_url, DEFAULT_COMPARE_URL);

    let settings = settings_with(&[("COMPARE_URL", "ftp://files.example/compare")]);
    assert_eq!(settings.compare_url, DEFAULT_COMPARE_URL);
}

#[test]
fn parses_timeout_and_stale_policy() {
    let settings = settings_with(&[
        ("APP__REQUEST_TIMEOUT_SECS", "30"),
        ("APP__DISCARD_STALE_RESULTS", "yes"),
        ("APP__IMAGE_ENCODING", "data_uri"),
    ]);
    assert_eq!(settings.request_timeout, Some(Duration::from_secs(30)));
    assert!(settings.discard_stale_results);
    assert_eq!(settings.image_encoding, ImagePartEncoding::DataUri);
}

#[test]
fn zero_or_garbage_timeout_means_no_timeout() {
    assert_eq!(
        settings_with(&[("APP__REQUEST_TIMEOUT_SECS", "0")]).request_timeout,
        None
    );
    assert_eq!(
        settings_with(&[("APP__REQUEST_TIMEOUT_SECS", "soon")]).request_timeout,
        None
    );
}

#[test]
fn validate_compare_url_normalizes() {
    assert_eq!(
        validate_compare_url(" http://example.com ").as_deref(),
        Some("http://example.com/")
    );
    assert_eq!(validate_compare_url("not a url"), None);
}

use std::time::Duration;

use tracing::warn;
use url::Url;

pub const DEFAULT_COMPARE_URL: &str = "http://localhost:5000/compare";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImagePartEncoding {
    /// Raw bytes with the image's mime type.
    #[default]
    Binary,
    /// Text part holding a `data:<mime>;base64,...` string.
    DataUri,
}

impl ImagePartEncoding {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "binary" | "bytes" => Some(Self::Binary),
            "data_uri" | "data-uri" | "datauri" => Some(Self::DataUri),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub compare_url: String,
    pub request_timeout: Option<Duration>,
    pub discard_stale_results: bool,
    pub image_encoding: ImagePartEncoding,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            compare_url: DEFAULT_COMPARE_URL.into(),
            request_timeout: None,
            discard_stale_results: false,
            image_encoding: ImagePartEncoding::Binary,
        }
    }
}

pub fn load_settings() -> ClientSettings {
    load_settings_from(|key| std::env::var(key).ok())
}

pub(crate) fn load_settings_from(lookup: impl Fn(&str) -> Option<String>) -> ClientSettings {
    let mut settings = ClientSettings::default();

    for key in ["COMPARE_URL", "APP__COMPARE_URL"] {
        if let Some(v) = lookup(key) {
            match validate_compare_url(&v) {
                Some(url) => settings.compare_url = url,
                None => warn!(key, value = %v, "ignoring invalid comparison service url"),
            }
        }
    }

    if let Some(v) = lookup("APP__REQUEST_TIMEOUT_SECS") {
        match v.trim().parse::<u64>() {
            Ok(0) => settings.request_timeout = None,
            Ok(secs) => settings.request_timeout = Some(Duration::from_secs(secs)),
            Err(_) => warn!(value = %v, "ignoring invalid APP__REQUEST_TIMEOUT_SECS"),
        }
    }

    if let Some(v) = lookup("APP__DISCARD_STALE_RESULTS") {
        match parse_bool(&v) {
            Some(flag) => settings.discard_stale_results = flag,
            None => warn!(value = %v, "ignoring invalid APP__DISCARD_STALE_RESULTS"),
        }
    }

    if let Some(v) = lookup("APP__IMAGE_ENCODING") {
        match ImagePartEncoding::parse(&v) {
            Some(encoding) => settings.image_encoding = encoding,
            None => warn!(value = %v, "ignoring invalid APP__IMAGE_ENCODING"),
        }
    }

    settings
}

/// Accepts absolute http(s) URLs only; returns the normalized form.
pub fn validate_compare_url(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    match url.scheme() {
        "http" | "https" if url.host().is_some() => Some(url.to_string()),
        _ => None,
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
#[path = "tests/settings_tests.rs"]
mod tests;

//! Runtime configuration read from the environment (and `.env`, via dotenvy).
//!
//! The API key is the only secret. A missing key does not stop the server:
//! the UI reports it and every OCR endpoint refuses work before touching the
//! network.

use anyhow::{Context, Result};
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://api.mistral.ai";
pub const DEFAULT_OCR_MODEL: &str = "mistral-ocr-latest";
pub const DEFAULT_STRUCTURED_MODEL: &str = "pixtral-12b-latest";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 2;
const DEFAULT_MAX_WAIT_SECS: u64 = 30 * 60;
const DEFAULT_MAX_UPLOAD_MB: usize = 50;
const DEFAULT_MAX_STORED_ENTRIES: usize = 200;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_key: Option<String>,
    pub api_url: String,
    pub ocr_model: String,
    pub structured_model: String,
    pub bind_addr: String,
    /// Fixed delay between two batch status polls.
    pub poll_interval: Duration,
    /// Local deadline for a batch job to reach a terminal status.
    pub max_wait: Duration,
    pub max_upload_bytes: usize,
    /// Results (and finished batches) kept in memory before the oldest go.
    pub max_stored_entries: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_key = lookup("MISTRAL_API_KEY")
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());

        let poll_secs: u64 = parse_or(&lookup, "BATCH_POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS)?;
        let max_wait_secs: u64 = parse_or(&lookup, "BATCH_MAX_WAIT_SECS", DEFAULT_MAX_WAIT_SECS)?;
        let max_upload_mb: usize = parse_or(&lookup, "MAX_UPLOAD_MB", DEFAULT_MAX_UPLOAD_MB)?;
        let max_stored_entries: usize =
            parse_or(&lookup, "MAX_STORED_ENTRIES", DEFAULT_MAX_STORED_ENTRIES)?;

        if poll_secs == 0 {
            anyhow::bail!("BATCH_POLL_INTERVAL_SECS must be at least 1");
        }
        if max_stored_entries == 0 {
            anyhow::bail!("MAX_STORED_ENTRIES must be at least 1");
        }
        let max_upload_bytes = max_upload_mb
            .checked_mul(1024 * 1024)
            .with_context(|| format!("MAX_UPLOAD_MB is too large: {}", max_upload_mb))?;

        Ok(Self {
            api_key,
            api_url: lookup("MISTRAL_API_URL")
                .unwrap_or_else(|| DEFAULT_API_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            ocr_model: lookup("OCR_MODEL").unwrap_or_else(|| DEFAULT_OCR_MODEL.to_string()),
            structured_model: lookup("STRUCTURED_MODEL")
                .unwrap_or_else(|| DEFAULT_STRUCTURED_MODEL.to_string()),
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            poll_interval: Duration::from_secs(poll_secs),
            max_wait: Duration::from_secs(max_wait_secs),
            max_upload_bytes,
            max_stored_entries,
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: {:?}", key, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup_from(&[])).unwrap();
        assert!(config.api_key.is_none());
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.ocr_model, "mistral-ocr-latest");
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert_eq!(config.max_wait, Duration::from_secs(1800));
        assert_eq!(config.max_upload_bytes, 50 * 1024 * 1024);
        assert_eq!(config.max_stored_entries, 200);
    }

    #[test]
    fn test_blank_api_key_is_missing() {
        let config = AppConfig::from_lookup(lookup_from(&[("MISTRAL_API_KEY", "  ")])).unwrap();
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("MISTRAL_API_KEY", "sk-test"),
            ("MISTRAL_API_URL", "http://localhost:9999/"),
            ("BATCH_POLL_INTERVAL_SECS", "5"),
            ("MAX_UPLOAD_MB", "1"),
        ]))
        .unwrap();
        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.api_url, "http://localhost:9999");
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.max_upload_bytes, 1024 * 1024);
    }

    #[test]
    fn test_invalid_number_rejected() {
        let result = AppConfig::from_lookup(lookup_from(&[("BATCH_MAX_WAIT_SECS", "soon")]));
        assert!(result.is_err());

        let result = AppConfig::from_lookup(lookup_from(&[("BATCH_POLL_INTERVAL_SECS", "0")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_oversized_upload_limit_rejected() {
        let huge = usize::MAX.to_string();
        let err = AppConfig::from_lookup(lookup_from(&[("MAX_UPLOAD_MB", huge.as_str())])).unwrap_err();
        assert!(err.to_string().contains("MAX_UPLOAD_MB is too large"));
    }
}

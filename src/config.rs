//! Startup configuration, read once from the environment.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::translate::provider::ProviderConfig;
use crate::translate::throttle::ThrottleConfig;

const DEFAULT_MIN_INTERVAL_MS: u64 = 4_000;
const DEFAULT_COOLDOWN_MS: u64 = 15_000;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_SOURCE_LANGUAGE: &str = "english";
const DEFAULT_CACHE_PATH: &str = "translations.db";
const DEFAULT_VOLATILE_CAPACITY: usize = 512;

/// Transport timeout used when attempts have no per-attempt limit.
const FALLBACK_HTTP_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct Config {
    pub provider: ProviderConfig,
    pub throttle: ThrottleConfig,
    pub source_language: String,
    pub cache_path: PathBuf,
    pub volatile_capacity: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let provider = ProviderConfig::select(&lookup)?;

        let min_interval_ms = parse_u64(&lookup, "TRANSLATE_MIN_INTERVAL_MS", DEFAULT_MIN_INTERVAL_MS)?;
        let cooldown_ms = parse_u64(&lookup, "TRANSLATE_RATE_LIMIT_COOLDOWN_MS", DEFAULT_COOLDOWN_MS)?;
        if cooldown_ms <= min_interval_ms {
            return Err(ConfigError::CooldownTooShort {
                cooldown_ms,
                min_interval_ms,
            });
        }
        let timeout_ms = parse_u64(&lookup, "TRANSLATE_REQUEST_TIMEOUT_MS", DEFAULT_REQUEST_TIMEOUT_MS)?;

        let volatile_capacity = parse_u64(
            &lookup,
            "TRANSLATE_VOLATILE_CAPACITY",
            DEFAULT_VOLATILE_CAPACITY as u64,
        )? as usize;
        if volatile_capacity == 0 {
            return Err(ConfigError::Invalid {
                key: "TRANSLATE_VOLATILE_CAPACITY",
                value: "0".into(),
            });
        }

        let source_language = lookup("TRANSLATE_SOURCE_LANGUAGE")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SOURCE_LANGUAGE.to_string());
        let cache_path = lookup("TRANSLATE_CACHE_PATH")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_PATH));

        Ok(Self {
            provider,
            throttle: ThrottleConfig {
                min_interval: Duration::from_millis(min_interval_ms),
                cooldown: Duration::from_millis(cooldown_ms),
                request_timeout: (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms)),
            },
            source_language,
            cache_path,
            volatile_capacity,
        })
    }

    /// reqwest-level timeout; slightly above the per-attempt limit so the
    /// throttle's timer fires first.
    pub fn http_timeout(&self) -> Duration {
        self.throttle
            .request_timeout
            .map_or(FALLBACK_HTTP_TIMEOUT, |t| t + Duration::from_secs(5))
    }
}

fn parse_u64(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: u64,
) -> Result<u64, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}

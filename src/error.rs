//! Error taxonomy for the translation subsystem.
//! Only `ConfigError` ever escapes to a caller; everything raised while
//! translating ends up as the reason attached to a `Fallback` result.

use thiserror::Error;

/// Startup configuration failure. Fatal: the process must not start.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no upstream provider configured (set GEMINI_API_KEY, OPENAI_API_KEY or DEEPSEEK_API_KEY)")]
    NoProvider,

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("rate limit cooldown ({cooldown_ms}ms) must be longer than the minimum interval ({min_interval_ms}ms)")]
    CooldownTooShort { cooldown_ms: u64, min_interval_ms: u64 },

    #[error("failed to build HTTP client: {0}")]
    Http(String),

    #[error("failed to open durable cache: {0}")]
    Cache(#[from] CacheError),
}

/// Failure reported by an upstream text-generation backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    /// Quota or requests-per-minute rejection. The only kind that is retried.
    #[error("upstream rate limited: {body}")]
    RateLimited { body: String },

    #[error("upstream returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("upstream transport error: {0}")]
    Transport(String),

    /// Success status, but the body carried no usable text.
    #[error("upstream reply malformed: {0}")]
    Malformed(String),

    #[error("upstream call timed out")]
    Timeout,

    #[error("upstream call cancelled")]
    Cancelled,
}

impl UpstreamError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, UpstreamError::RateLimited { .. })
    }
}

/// The upstream reply did not have the expected structure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("empty reply")]
    Empty,

    #[error("fenced block is not terminated")]
    UnterminatedFence,

    #[error("reply contains {0} fenced blocks, expected at most one")]
    MultipleFences(usize),

    #[error("reply is not valid JSON: {0}")]
    Json(String),

    #[error("reply has the wrong shape: {0}")]
    Shape(String),
}

impl From<serde_json::Error> for PayloadError {
    fn from(e: serde_json::Error) -> Self {
        PayloadError::Json(e.to_string())
    }
}

/// Reason a translation degraded to the original content.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslateError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("parse error: {0}")]
    Parse(#[from] PayloadError),

    /// The task producing the shared outcome went away without reporting one.
    #[error("translation task aborted")]
    Aborted,
}

/// Durable tier failure. Never surfaced past `TranslationCache`.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("cache entry encoding: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("durable cache task failed: {0}")]
    Task(String),
}

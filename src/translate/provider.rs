//! Upstream text-generation backends.
//! One provider is chosen at startup from the configured credentials and
//! injected into the rate-limited client; nothing above this layer knows
//! which backend is live.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use super::gemini::GeminiProvider;
use super::openai::OpenAiCompatProvider;
use crate::error::{ConfigError, UpstreamError};

/// A text-generation backend. `generate` sends one prompt and returns the
/// raw reply text; non-success responses become `UpstreamError`.
#[async_trait]
pub trait UpstreamTextProvider: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, UpstreamError>;
    fn name(&self) -> &str;
}

/// Backend family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Gemini,
    OpenAi,
    DeepSeek,
}

impl ProviderKind {
    /// Selection priority when several credentials are present.
    pub const PRIORITY: [ProviderKind; 3] =
        [ProviderKind::Gemini, ProviderKind::OpenAi, ProviderKind::DeepSeek];

    pub fn key_var(self) -> &'static str {
        match self {
            ProviderKind::Gemini => "GEMINI_API_KEY",
            ProviderKind::OpenAi => "OPENAI_API_KEY",
            ProviderKind::DeepSeek => "DEEPSEEK_API_KEY",
        }
    }

    pub fn model_var(self) -> &'static str {
        match self {
            ProviderKind::Gemini => "GEMINI_MODEL",
            ProviderKind::OpenAi => "OPENAI_MODEL",
            ProviderKind::DeepSeek => "DEEPSEEK_MODEL",
        }
    }

    pub fn base_url_var(self) -> &'static str {
        match self {
            ProviderKind::Gemini => "GEMINI_BASE_URL",
            ProviderKind::OpenAi => "OPENAI_BASE_URL",
            ProviderKind::DeepSeek => "DEEPSEEK_BASE_URL",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            ProviderKind::Gemini => "gemini-1.5-flash",
            ProviderKind::OpenAi => "gpt-4o-mini",
            ProviderKind::DeepSeek => "deepseek-chat",
        }
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            ProviderKind::Gemini => "https://generativelanguage.googleapis.com",
            ProviderKind::OpenAi => "https://api.openai.com",
            ProviderKind::DeepSeek => "https://api.deepseek.com",
        }
    }
}

/// Resolved provider settings.
#[derive(Clone)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl ProviderConfig {
    /// Pick the first provider in `PRIORITY` whose credential `lookup` finds.
    pub fn select(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let present = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        for kind in ProviderKind::PRIORITY {
            if let Some(api_key) = present(kind.key_var()) {
                return Ok(Self {
                    kind,
                    api_key: api_key.trim().to_string(),
                    model: present(kind.model_var())
                        .unwrap_or_else(|| kind.default_model().to_string()),
                    base_url: present(kind.base_url_var())
                        .unwrap_or_else(|| kind.default_base_url().to_string())
                        .trim_end_matches('/')
                        .to_string(),
                });
            }
        }
        Err(ConfigError::NoProvider)
    }
}

/// Shared reqwest client: pooled connections, transport-level timeout.
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, ConfigError> {
    reqwest::Client::builder()
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(90))
        .timeout(timeout)
        .build()
        .map_err(|e| ConfigError::Http(e.to_string()))
}

/// Construct the provider for `config`.
pub fn build_provider(
    config: &ProviderConfig,
    http_timeout: Duration,
) -> Result<Arc<dyn UpstreamTextProvider>, ConfigError> {
    let http = http_client(http_timeout)?;
    info!(provider = ?config.kind, model = %config.model, "upstream provider selected");
    let provider: Arc<dyn UpstreamTextProvider> = match config.kind {
        ProviderKind::Gemini => Arc::new(GeminiProvider::new(http, config)),
        ProviderKind::OpenAi | ProviderKind::DeepSeek => {
            Arc::new(OpenAiCompatProvider::new(http, config))
        }
    };
    Ok(provider)
}

/// Map a non-success HTTP status to the error taxonomy. 429 is the
/// distinguished rate-limit signal.
pub(crate) fn status_error(status: reqwest::StatusCode, body: String) -> UpstreamError {
    let body: String = body.chars().take(200).collect();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        UpstreamError::RateLimited { body }
    } else {
        UpstreamError::Status {
            status: status.as_u16(),
            body,
        }
    }
}

pub(crate) fn transport_error(e: reqwest::Error) -> UpstreamError {
    if e.is_timeout() {
        UpstreamError::Timeout
    } else {
        UpstreamError::Transport(e.to_string())
    }
}

//! OpenAI-compatible chat/completions client (OpenAI, DeepSeek).
//! One non-streaming request per `generate`; throttling and retry live in
//! `throttle::RateLimitedClient`.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::provider::{status_error, transport_error, ProviderConfig, UpstreamTextProvider};
use crate::error::UpstreamError;

const SYSTEM_PROMPT: &str = "You are a professional translator. Follow the output format exactly.";

pub struct OpenAiCompatProvider {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiCompatProvider {
    pub fn new(http: reqwest::Client, config: &ProviderConfig) -> Self {
        Self {
            http,
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone(),
            model: config.model.clone(),
        }
    }

    fn request_body(&self, prompt: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": prompt}
            ],
            "stream": false,
            "temperature": 0.2
        })
    }
}

#[async_trait]
impl UpstreamTextProvider for OpenAiCompatProvider {
    async fn generate(&self, prompt: &str) -> Result<String, UpstreamError> {
        debug!(model = %self.model, prompt_len = prompt.len(), "chat completion request");

        let resp = self
            .http
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&self.request_body(prompt))
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error(status, body));
        }

        let parsed: ChatResponse = resp.json().await.map_err(transport_error)?;
        extract_content(parsed)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

fn extract_content(resp: ChatResponse) -> Result<String, UpstreamError> {
    resp.choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| UpstreamError::Malformed("response has no message content".into()))
}

// --- Response types ---

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

//! Gemini `generateContent` client.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::provider::{status_error, transport_error, ProviderConfig, UpstreamTextProvider};
use crate::error::UpstreamError;

pub struct GeminiProvider {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiProvider {
    pub fn new(http: reqwest::Client, config: &ProviderConfig) -> Self {
        Self {
            http,
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone(),
            model: config.model.clone(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl UpstreamTextProvider for GeminiProvider {
    async fn generate(&self, prompt: &str) -> Result<String, UpstreamError> {
        debug!(model = %self.model, prompt_len = prompt.len(), "generateContent request");

        let body = serde_json::json!({
            "contents": [{"parts": [{"text": prompt}]}],
            "generationConfig": {"temperature": 0.2}
        });

        let resp = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error(status, body));
        }

        let parsed: GenerateResponse = resp.json().await.map_err(transport_error)?;
        extract_text(parsed)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

/// Concatenate the text parts of the first candidate.
fn extract_text(resp: GenerateResponse) -> Result<String, UpstreamError> {
    let text: String = resp
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();
    if text.is_empty() {
        return Err(UpstreamError::Malformed(
            "response has no candidate text".into(),
        ));
    }
    Ok(text)
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    text: Option<String>,
}

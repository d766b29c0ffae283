//! Reply payload extraction.
//!
//! Upstream models often wrap their answer in a fenced code block, sometimes
//! with a language tag. A reply is accepted either as bare text or as text
//! containing exactly one fenced block; the block's body is the payload.
//! Only the tags in `FENCED_BLOCK`, written directly after the opening fence
//! and ending the line, are stripped; any other first line is content.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;

use crate::error::PayloadError;

static FENCED_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(?:(?i:json5?|jsonc|text|txt|plaintext|plain|markdown|md)?[ \t]*\r?\n)?(.*?)```")
        .expect("fence pattern is valid")
});

const FENCE: &str = "```";

/// Locate the payload inside `raw`: the body of its single fenced block, or
/// the whole trimmed reply when there is no fence.
pub fn extract_payload(raw: &str) -> Result<&str, PayloadError> {
    let blocks: Vec<_> = FENCED_BLOCK.captures_iter(raw).collect();
    let payload = match blocks.len() {
        0 => {
            if raw.contains(FENCE) {
                return Err(PayloadError::UnterminatedFence);
            }
            raw.trim()
        }
        1 => {
            let whole = blocks[0].get(0).map_or("", |m| m.as_str());
            let rest = raw.replacen(whole, "", 1);
            if rest.contains(FENCE) {
                return Err(PayloadError::UnterminatedFence);
            }
            blocks[0].get(1).map_or("", |m| m.as_str()).trim()
        }
        n => return Err(PayloadError::MultipleFences(n)),
    };
    if payload.is_empty() {
        return Err(PayloadError::Empty);
    }
    Ok(payload)
}

/// Plain-text payload.
pub fn extract_text(raw: &str) -> Result<String, PayloadError> {
    extract_payload(raw).map(str::to_string)
}

/// JSON payload decoded into `T`.
pub fn parse_json<T: DeserializeOwned>(raw: &str) -> Result<T, PayloadError> {
    let payload = extract_payload(raw)?;
    Ok(serde_json::from_str(payload)?)
}

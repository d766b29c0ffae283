//! Content units and the per-kind translation contract.
//!
//! Each kind supplies its identity, the snapshot embedded in the prompt,
//! a parser for the upstream reply (the "entry" stored in cache), and the
//! rule that overlays an entry onto the original fields. Merging is lenient:
//! any field missing or blank in the entry keeps its original value.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{fingerprint, payload, ContentKind};
use crate::error::PayloadError;

/// Scenario lists sent upstream are capped at this many items.
pub const MAX_LIST_ITEMS: usize = 5;

/// A piece of original-language content that can be translated and cached.
pub trait Translatable: Clone + Send + Sync + 'static {
    const KIND: ContentKind;

    /// Translated field set, as parsed from the reply and stored in cache.
    type Entry: Serialize + DeserializeOwned + Clone + Send + Sync + 'static;

    /// Stable identity, independent of process lifetime.
    fn content_id(&self) -> String;

    /// Serialized content embedded in the prompt.
    fn snapshot(&self) -> Value;

    fn parse_reply(&self, raw: &str) -> Result<Self::Entry, PayloadError>;

    /// Overlay `entry` onto a copy of the original fields.
    fn merge(&self, entry: &Self::Entry) -> Self;

    /// Original-language text used to spot cache entries that were never
    /// actually translated. `None` disables the check for this kind.
    fn primary_text(&self) -> Option<&str> {
        None
    }

    fn entry_primary_text(_entry: &Self::Entry) -> Option<&str> {
        None
    }
}

fn overlay(translated: Option<&str>, original: &str) -> String {
    match translated {
        Some(t) if !t.trim().is_empty() => t.to_string(),
        _ => original.to_string(),
    }
}

fn overlay_list(original: &[String], translated: Option<&Vec<String>>) -> Vec<String> {
    original
        .iter()
        .enumerate()
        .map(|(i, orig)| overlay(translated.and_then(|t| t.get(i)).map(String::as_str), orig))
        .collect()
}

fn require(field: &'static str, value: &Option<String>) -> Result<(), PayloadError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(()),
        _ => Err(PayloadError::Shape(format!("missing {field}"))),
    }
}

// --- Puzzles ---

/// Puzzle fields. Identified by the puzzle's own id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PuzzleFields {
    pub id: String,
    pub title: String,
    pub question: String,
    pub ideal_answer: String,
    #[serde(default)]
    pub key_principles: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PuzzleTranslation {
    pub title: Option<String>,
    pub question: Option<String>,
    pub ideal_answer: Option<String>,
    pub key_principles: Option<Vec<String>>,
}

impl Translatable for PuzzleFields {
    const KIND: ContentKind = ContentKind::Puzzle;
    type Entry = PuzzleTranslation;

    fn content_id(&self) -> String {
        self.id.clone()
    }

    fn snapshot(&self) -> Value {
        serde_json::json!({
            "title": self.title,
            "question": self.question,
            "idealAnswer": self.ideal_answer,
            "keyPrinciples": self.key_principles,
        })
    }

    fn parse_reply(&self, raw: &str) -> Result<PuzzleTranslation, PayloadError> {
        let entry: PuzzleTranslation = payload::parse_json(raw)?;
        require("question", &entry.question)?;
        Ok(entry)
    }

    fn merge(&self, entry: &PuzzleTranslation) -> Self {
        Self {
            id: self.id.clone(),
            title: overlay(entry.title.as_deref(), &self.title),
            question: overlay(entry.question.as_deref(), &self.question),
            ideal_answer: overlay(entry.ideal_answer.as_deref(), &self.ideal_answer),
            key_principles: overlay_list(&self.key_principles, entry.key_principles.as_ref()),
        }
    }

    fn primary_text(&self) -> Option<&str> {
        Some(&self.question)
    }

    fn entry_primary_text(entry: &PuzzleTranslation) -> Option<&str> {
        entry.question.as_deref()
    }
}

// --- Training scenarios ---

/// Training scenario. Has no natural id; identified by a content fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingScenario {
    pub title: String,
    pub briefing: String,
    pub claim: String,
    pub outcome: String,
    pub context: String,
    #[serde(default)]
    pub insight: String,
    #[serde(default)]
    pub evidence: Vec<String>,
    #[serde(default)]
    pub stakeholders: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScenarioTranslation {
    pub title: Option<String>,
    pub briefing: Option<String>,
    pub claim: Option<String>,
    pub outcome: Option<String>,
    pub context: Option<String>,
    pub insight: Option<String>,
    pub evidence: Option<Vec<String>>,
    pub stakeholders: Option<Vec<String>>,
}

impl Translatable for TrainingScenario {
    const KIND: ContentKind = ContentKind::Scenario;
    type Entry = ScenarioTranslation;

    fn content_id(&self) -> String {
        fingerprint::scenario_fingerprint(&self.title, &self.briefing, &self.insight)
    }

    fn snapshot(&self) -> Value {
        let capped = |items: &[String]| -> Vec<String> {
            items.iter().take(MAX_LIST_ITEMS).cloned().collect()
        };
        serde_json::json!({
            "title": self.title,
            "briefing": self.briefing,
            "claim": self.claim,
            "outcome": self.outcome,
            "context": self.context,
            "insight": self.insight,
            "evidence": capped(&self.evidence),
            "stakeholders": capped(&self.stakeholders),
        })
    }

    fn parse_reply(&self, raw: &str) -> Result<ScenarioTranslation, PayloadError> {
        let entry: ScenarioTranslation = payload::parse_json(raw)?;
        require("briefing", &entry.briefing)?;
        Ok(entry)
    }

    fn merge(&self, entry: &ScenarioTranslation) -> Self {
        Self {
            title: overlay(entry.title.as_deref(), &self.title),
            briefing: overlay(entry.briefing.as_deref(), &self.briefing),
            claim: overlay(entry.claim.as_deref(), &self.claim),
            outcome: overlay(entry.outcome.as_deref(), &self.outcome),
            context: overlay(entry.context.as_deref(), &self.context),
            insight: overlay(entry.insight.as_deref(), &self.insight),
            evidence: overlay_list(&self.evidence, entry.evidence.as_ref()),
            stakeholders: overlay_list(&self.stakeholders, entry.stakeholders.as_ref()),
        }
    }

    fn primary_text(&self) -> Option<&str> {
        Some(&self.briefing)
    }

    fn entry_primary_text(entry: &ScenarioTranslation) -> Option<&str> {
        entry.briefing.as_deref()
    }
}

// --- Free-text feedback ---

/// Feedback is either plain text or an arbitrary JSON object whose string
/// leaves are translated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Feedback {
    Text(String),
    Structured(Value),
}

fn overlay_value(original: &Value, translated: &Value) -> Value {
    match (original, translated) {
        (Value::Object(orig), Value::Object(tr)) => {
            let merged: Map<String, Value> = orig
                .iter()
                .map(|(k, v)| {
                    let value = tr.get(k).map_or_else(|| v.clone(), |tv| overlay_value(v, tv));
                    (k.clone(), value)
                })
                .collect();
            Value::Object(merged)
        }
        (Value::Array(orig), Value::Array(tr)) => Value::Array(
            orig.iter()
                .enumerate()
                .map(|(i, v)| tr.get(i).map_or_else(|| v.clone(), |tv| overlay_value(v, tv)))
                .collect(),
        ),
        (Value::String(_), Value::String(s)) if !s.trim().is_empty() => Value::String(s.clone()),
        _ => original.clone(),
    }
}

/// Whether `translated` supplies a non-blank string for at least one string
/// leaf of `original`. A reply that overlays nothing would merge back to the
/// untranslated original.
fn overlays_some_text(original: &Value, translated: &Value) -> bool {
    match (original, translated) {
        (Value::Object(orig), Value::Object(tr)) => orig
            .iter()
            .any(|(k, v)| tr.get(k).is_some_and(|tv| overlays_some_text(v, tv))),
        (Value::Array(orig), Value::Array(tr)) => orig
            .iter()
            .zip(tr)
            .any(|(v, tv)| overlays_some_text(v, tv)),
        (Value::String(_), Value::String(s)) => !s.trim().is_empty(),
        _ => false,
    }
}

impl Translatable for Feedback {
    const KIND: ContentKind = ContentKind::Feedback;
    type Entry = Value;

    fn content_id(&self) -> String {
        fingerprint::value_fingerprint(&self.snapshot())
    }

    fn snapshot(&self) -> Value {
        match self {
            Feedback::Text(text) => Value::String(text.clone()),
            Feedback::Structured(value) => value.clone(),
        }
    }

    fn parse_reply(&self, raw: &str) -> Result<Value, PayloadError> {
        match self {
            Feedback::Text(_) => Ok(Value::String(payload::extract_text(raw)?)),
            Feedback::Structured(original) => {
                let value: Value = payload::parse_json(raw)?;
                let same_shape = matches!(
                    (original, &value),
                    (Value::Object(_), Value::Object(_)) | (Value::Array(_), Value::Array(_))
                ) || (!original.is_object() && !original.is_array());
                if !same_shape {
                    return Err(PayloadError::Shape(
                        "structured feedback reply does not match original shape".into(),
                    ));
                }
                if !overlays_some_text(original, &value) {
                    return Err(PayloadError::Shape(
                        "structured feedback reply carries no translated text".into(),
                    ));
                }
                Ok(value)
            }
        }
    }

    fn merge(&self, entry: &Value) -> Self {
        match self {
            Feedback::Text(text) => Feedback::Text(overlay(entry.as_str(), text)),
            Feedback::Structured(original) => Feedback::Structured(overlay_value(original, entry)),
        }
    }
}

//! Translation subsystem: providers, global throttle, two-tier cache,
//! request coalescing and the orchestrating service.

pub mod cache;
pub mod content;
pub mod fingerprint;
pub mod gemini;
pub mod inflight;
pub mod openai;
pub mod payload;
pub mod prompt;
pub mod provider;
pub mod service;
pub mod sqlite_cache;
pub mod throttle;

use serde::{Deserialize, Serialize};

use crate::error::TranslateError;

pub use content::{Feedback, PuzzleFields, Translatable, TrainingScenario};
pub use service::TranslationService;

/// Callers are expected to cap batches at this size before calling
/// `TranslationService::translate_batch`.
pub const MAX_BATCH_SIZE: usize = 10;

/// Content kind; selects prompt template, reply shape and cache tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Puzzle,
    Feedback,
    Scenario,
}

/// Cache tier a content kind lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Durable,
    Volatile,
}

impl ContentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentKind::Puzzle => "puzzle",
            ContentKind::Feedback => "feedback",
            ContentKind::Scenario => "scenario",
        }
    }

    /// Feedback is too free-form to share across users.
    pub fn tier(self) -> Tier {
        match self {
            ContentKind::Puzzle | ContentKind::Scenario => Tier::Durable,
            ContentKind::Feedback => Tier::Volatile,
        }
    }
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lowercase and trim a language name so "Spanish", " spanish" and "SPANISH"
/// address the same cache slot.
pub fn normalize_language(language: &str) -> String {
    language.trim().to_lowercase()
}

/// (content kind, content identity, normalized target language).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub kind: ContentKind,
    pub content_id: String,
    pub language: String,
}

impl CacheKey {
    pub fn new(kind: ContentKind, content_id: impl Into<String>, language: &str) -> Self {
        Self {
            kind,
            content_id: content_id.into(),
            language: normalize_language(language),
        }
    }

    /// Key for `unit` in `language`.
    pub fn for_unit<T: Translatable>(unit: &T, language: &str) -> Self {
        Self::new(T::KIND, unit.content_id(), language)
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.kind, self.content_id, self.language)
    }
}

/// Outcome of one translation request.
#[derive(Debug, Clone, PartialEq)]
pub enum TranslationResult<T> {
    Translated(T),
    /// Original-language fields, explicitly flagged. Never cached.
    Fallback { original: T, reason: TranslateError },
}

impl<T> TranslationResult<T> {
    pub fn is_fallback(&self) -> bool {
        matches!(self, TranslationResult::Fallback { .. })
    }

    pub fn fields(&self) -> &T {
        match self {
            TranslationResult::Translated(fields) => fields,
            TranslationResult::Fallback { original, .. } => original,
        }
    }

    pub fn into_fields(self) -> T {
        match self {
            TranslationResult::Translated(fields) => fields,
            TranslationResult::Fallback { original, .. } => original,
        }
    }

    /// Boundary shape handed to UI collaborators.
    pub fn into_localized(self) -> Localized<T> {
        let fallback = self.is_fallback();
        Localized {
            fields: self.into_fields(),
            fallback,
        }
    }
}

/// Translated (or original) fields plus a marker telling the caller whether
/// they got a real translation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Localized<T> {
    #[serde(flatten)]
    pub fields: T,
    pub fallback: bool,
}

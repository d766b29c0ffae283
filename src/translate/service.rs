//! Translation orchestration.
//!
//! `translate` flow: pass-through when no translation is needed, then cache
//! lookup (with the untranslated-entry check), then join or start the
//! in-flight request for the key. The leader renders the prompt, calls the
//! throttled client, parses the reply, writes it through to the cache and
//! publishes the outcome to every waiter. Failures come back as `Fallback`
//! carrying the original fields and are never cached.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::cache::{CacheStats, TranslationCache};
use super::content::{Feedback, PuzzleFields, Translatable, TrainingScenario};
use super::inflight::{InFlightTable, Outcome};
use super::provider::build_provider;
use super::sqlite_cache::SqliteStore;
use super::throttle::RateLimitedClient;
use super::{normalize_language, prompt, CacheKey, TranslationResult};
use crate::config::Config;
use crate::error::{ConfigError, PayloadError, TranslateError, UpstreamError};
use crate::metrics::{metric_names, MetricsRegistry, MetricsSnapshot};

/// Cheap to clone; all clones share the throttle, cache and in-flight table.
#[derive(Clone)]
pub struct TranslationService {
    inner: Arc<Inner>,
}

struct Inner {
    client: RateLimitedClient,
    cache: TranslationCache,
    in_flight: Arc<InFlightTable>,
    metrics: Arc<MetricsRegistry>,
    /// Normalized language the content is authored in.
    source_language: String,
    shutdown: CancellationToken,
}

fn entry_error(e: serde_json::Error) -> TranslateError {
    TranslateError::Parse(PayloadError::from(e))
}

impl TranslationService {
    pub fn new(
        client: RateLimitedClient,
        cache: TranslationCache,
        source_language: &str,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                cache,
                in_flight: Arc::new(InFlightTable::new()),
                metrics,
                source_language: normalize_language(source_language),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Build the whole stack from startup configuration.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let metrics = Arc::new(MetricsRegistry::new());
        let provider = build_provider(&config.provider, config.http_timeout())?;
        let client = RateLimitedClient::new(provider, config.throttle, Arc::clone(&metrics));
        let store = SqliteStore::open(&config.cache_path)?;
        let cache = TranslationCache::new(Arc::new(store), config.volatile_capacity);
        info!(
            source_language = %config.source_language,
            min_interval_ms = config.throttle.min_interval.as_millis() as u64,
            "translation service ready"
        );
        Ok(Self::new(client, cache, &config.source_language, metrics))
    }

    /// `None` when `language` needs no translation (absent, blank, or the
    /// source language).
    fn target_language<'a>(&self, language: Option<&'a str>) -> Option<&'a str> {
        language
            .filter(|l| !l.trim().is_empty())
            .filter(|l| normalize_language(l) != self.inner.source_language)
    }

    /// Translate one unit. Never fails: upstream or parse problems yield
    /// `Fallback` with the original fields.
    pub async fn translate<T: Translatable>(
        &self,
        unit: &T,
        language: Option<&str>,
    ) -> TranslationResult<T> {
        let Some(language) = self.target_language(language) else {
            return TranslationResult::Translated(unit.clone());
        };
        let key = CacheKey::for_unit(unit, language);

        if let Some(entry) = self.inner.cached_entry(unit, &key).await {
            self.inner.metrics.incr(metric_names::CACHE_HIT);
            debug!(key = %key, "cache hit");
            return TranslationResult::Translated(unit.merge(&entry));
        }
        self.inner.metrics.incr(metric_names::CACHE_MISS);

        match self.fetch(unit, key.clone(), language).await {
            Ok(entry) => TranslationResult::Translated(unit.merge(&entry)),
            Err(reason) => {
                self.inner.metrics.incr(metric_names::FALLBACK);
                warn!(key = %key, reason = %reason, "translation failed, serving original");
                TranslationResult::Fallback {
                    original: unit.clone(),
                    reason,
                }
            }
        }
    }

    /// Join the in-flight request for `key`, or lead a new one.
    async fn fetch<T: Translatable>(
        &self,
        unit: &T,
        key: CacheKey,
        language: &str,
    ) -> Result<T::Entry, TranslateError> {
        let (waiter, completion) = self.inner.in_flight.join_or_start(&key);
        match completion {
            Some(completion) => {
                let inner = Arc::clone(&self.inner);
                let unit = unit.clone();
                let language = language.to_string();
                // Detached so the outcome is published even if this caller
                // goes away while waiting.
                tokio::spawn(async move {
                    let outcome = inner.run_upstream(&unit, completion.key(), &language).await;
                    completion.complete(outcome);
                });
            }
            None => {
                self.inner.metrics.incr(metric_names::COALESCED);
                debug!(key = %key, "joined in-flight translation");
            }
        }
        let value = waiter.outcome().await?;
        serde_json::from_value(value).map_err(entry_error)
    }

    /// Translate `units` in input order. Cached units are answered first;
    /// the rest go upstream one at a time through the shared throttle.
    /// Callers cap the batch size (see `MAX_BATCH_SIZE`).
    pub async fn translate_batch<T: Translatable>(
        &self,
        units: &[T],
        language: Option<&str>,
    ) -> Vec<TranslationResult<T>> {
        let Some(language) = self.target_language(language) else {
            return units
                .iter()
                .cloned()
                .map(TranslationResult::Translated)
                .collect();
        };

        let mut cached: Vec<Option<T::Entry>> = Vec::with_capacity(units.len());
        for unit in units {
            let key = CacheKey::for_unit(unit, language);
            cached.push(self.inner.cached_entry(unit, &key).await);
        }
        let pending = cached.iter().filter(|hit| hit.is_none()).count();
        info!(kind = T::KIND.as_str(), total = units.len(), pending, "batch translation");

        let mut results = Vec::with_capacity(units.len());
        for (unit, hit) in units.iter().zip(cached) {
            let result = match hit {
                Some(entry) => {
                    self.inner.metrics.incr(metric_names::CACHE_HIT);
                    TranslationResult::Translated(unit.merge(&entry))
                }
                None => self.translate(unit, Some(language)).await,
            };
            results.push(result);
        }
        results
    }

    pub async fn translate_puzzle(
        &self,
        puzzle: &PuzzleFields,
        language: Option<&str>,
    ) -> TranslationResult<PuzzleFields> {
        self.translate(puzzle, language).await
    }

    /// Feedback uses the volatile tier only.
    pub async fn translate_feedback(
        &self,
        feedback: &Feedback,
        language: Option<&str>,
    ) -> TranslationResult<Feedback> {
        self.translate(feedback, language).await
    }

    pub async fn translate_scenario(
        &self,
        scenario: &TrainingScenario,
        language: Option<&str>,
    ) -> TranslationResult<TrainingScenario> {
        self.translate(scenario, language).await
    }

    /// Drop the cached translation of `unit` in `language`.
    pub async fn invalidate<T: Translatable>(&self, unit: &T, language: &str) -> bool {
        let key = CacheKey::for_unit(unit, language);
        let removed = self.inner.cache.invalidate(&key).await;
        info!(key = %key, removed, "cache invalidated");
        removed
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.inner.cache.stats().await
    }

    pub fn metrics_summary(&self) -> MetricsSnapshot {
        self.inner.metrics.summary()
    }

    /// Number of keys with an upstream call outstanding.
    pub fn pending_requests(&self) -> usize {
        self.inner.in_flight.len()
    }

    /// Cancel outstanding upstream work; affected callers get `Fallback`.
    pub fn shutdown(&self) {
        info!("translation service shutting down");
        self.inner.shutdown.cancel();
    }
}

impl Inner {
    /// Cached entry for `key`, unless it is unreadable or still holds the
    /// original-language text (a fallback that was persisted by mistake).
    async fn cached_entry<T: Translatable>(&self, unit: &T, key: &CacheKey) -> Option<T::Entry> {
        let value = self.cache.get(key).await?;
        let entry: T::Entry = match serde_json::from_value(value) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key = %key, error = %e, "unreadable cache entry, treating as miss");
                return None;
            }
        };
        if let (Some(original), Some(cached)) = (unit.primary_text(), T::entry_primary_text(&entry)) {
            if original.trim() == cached.trim() {
                self.metrics.incr(metric_names::CACHE_SELF_HEALED);
                warn!(key = %key, "cached entry equals original text, ignoring it");
                return None;
            }
        }
        Some(entry)
    }

    /// Leader work for one key. Writes through to the cache only on success.
    async fn run_upstream<T: Translatable>(&self, unit: &T, key: &CacheKey, language: &str) -> Outcome {
        // A previous leader may have finished between our miss and our claim.
        if let Some(entry) = self.cached_entry(unit, key).await {
            return serde_json::to_value(entry).map_err(entry_error);
        }
        if self.shutdown.is_cancelled() {
            return Err(UpstreamError::Cancelled.into());
        }

        let span = self.metrics.span(metric_names::TRANSLATE_MISS);
        let request_id = uuid::Uuid::new_v4();
        debug!(%request_id, key = %key, provider = self.client.provider_name(), "upstream translation");

        let prompt = prompt::render(T::KIND, language, &unit.snapshot());
        let raw = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return Err(UpstreamError::Cancelled.into()),
            result = self.client.generate(&prompt) => result?,
        };

        let entry = unit.parse_reply(&raw)?;
        let value = serde_json::to_value(&entry).map_err(entry_error)?;
        self.cache.put(key, value.clone()).await;

        let elapsed_us = span.finish();
        info!(%request_id, key = %key, elapsed_ms = elapsed_us / 1000.0, "translated");
        Ok(value)
    }
}

//! End-to-end behaviour of `TranslationService` against a scripted upstream,
//! an in-memory durable tier and paused tokio time.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use parking_lot::Mutex;
use serde_json::json;
use tokio::time::Instant;

use lingua_cache::metrics::{metric_names, MetricsRegistry};
use lingua_cache::translate::cache::{DurableStore, TranslationCache};
use lingua_cache::translate::provider::UpstreamTextProvider;
use lingua_cache::translate::sqlite_cache::SqliteStore;
use lingua_cache::translate::throttle::{RateLimitedClient, ThrottleConfig};
use lingua_cache::{
    CacheKey, Feedback, PuzzleFields, TrainingScenario, TranslateError, TranslationResult,
    TranslationService, UpstreamError,
};

const MIN_INTERVAL: Duration = Duration::from_millis(4000);
const COOLDOWN: Duration = Duration::from_millis(15_000);

/// Replays scripted replies, then repeats `default_reply`. Records the
/// instant of every call.
struct MockProvider {
    latency: Duration,
    script: Mutex<VecDeque<Result<String, UpstreamError>>>,
    default_reply: String,
    calls: Mutex<Vec<Instant>>,
}

impl MockProvider {
    fn new(latency: Duration, default_reply: &str) -> Arc<Self> {
        Self::scripted(latency, default_reply, vec![])
    }

    fn scripted(
        latency: Duration,
        default_reply: &str,
        script: Vec<Result<String, UpstreamError>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            latency,
            script: Mutex::new(script.into()),
            default_reply: default_reply.to_string(),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    fn calls(&self) -> Vec<Instant> {
        let mut calls = self.calls.lock().clone();
        calls.sort();
        calls
    }
}

#[async_trait]
impl UpstreamTextProvider for MockProvider {
    async fn generate(&self, _prompt: &str) -> Result<String, UpstreamError> {
        self.calls.lock().push(Instant::now());
        tokio::time::sleep(self.latency).await;
        let next = self.script.lock().pop_front();
        next.unwrap_or_else(|| Ok(self.default_reply.clone()))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

struct Harness {
    service: TranslationService,
    store: Arc<SqliteStore>,
    provider: Arc<MockProvider>,
}

fn harness(provider: Arc<MockProvider>) -> Harness {
    harness_with_timeout(provider, Duration::from_secs(30))
}

fn harness_with_timeout(provider: Arc<MockProvider>, request_timeout: Duration) -> Harness {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let metrics = Arc::new(MetricsRegistry::new());
    let throttle = ThrottleConfig {
        min_interval: MIN_INTERVAL,
        cooldown: COOLDOWN,
        request_timeout: Some(request_timeout),
    };
    let client = RateLimitedClient::new(provider.clone(), throttle, Arc::clone(&metrics));
    let cache = TranslationCache::new(store.clone(), 16);
    Harness {
        service: TranslationService::new(client, cache, "English", metrics),
        store,
        provider,
    }
}

fn puzzle(id: &str) -> PuzzleFields {
    PuzzleFields {
        id: id.to_string(),
        title: "The Bridge".into(),
        question: "Who crosses first?".into(),
        ideal_answer: "The two fastest walkers.".into(),
        key_principles: vec!["Pair the slow walkers".into()],
    }
}

fn scenario() -> TrainingScenario {
    TrainingScenario {
        title: "Supplier recall".into(),
        briefing: "A key supplier recalls a batch of parts.".into(),
        claim: "The recall will not affect deliveries.".into(),
        outcome: "Deliveries slipped by two weeks.".into(),
        context: "Q3, single-source component.".into(),
        insight: "Single sourcing hides risk.".into(),
        evidence: vec!["Recall notice".into(), "Inventory report".into()],
        stakeholders: vec!["Procurement".into()],
    }
}

const SPANISH_PUZZLE: &str = "```json\n{\"title\": \"El Puente\", \"question\": \"¿Quién cruza primero?\", \
\"idealAnswer\": \"Los dos más rápidos.\", \"keyPrinciples\": [\"Emparejar a los lentos\"]}\n```";

fn stored(store: &SqliteStore, unit: &PuzzleFields, language: &str) -> Option<serde_json::Value> {
    store.get(&CacheKey::for_unit(unit, language)).unwrap()
}

#[tokio::test(start_paused = true)]
async fn concurrent_callers_share_one_upstream_call() {
    let h = harness(MockProvider::new(Duration::from_millis(1200), SPANISH_PUZZLE));
    let p = puzzle("puzzle-42");

    let (a, b) = tokio::join!(
        h.service.translate_puzzle(&p, Some("Spanish")),
        h.service.translate_puzzle(&p, Some("Spanish")),
    );

    assert_eq!(h.provider.call_count(), 1);
    assert_eq!(a, b);
    assert!(!a.is_fallback());
    assert_eq!(a.fields().question, "¿Quién cruza primero?");
    assert_eq!(h.service.pending_requests(), 0);
}

#[tokio::test(start_paused = true)]
async fn many_concurrent_callers_coalesce() {
    let h = harness(MockProvider::new(Duration::from_millis(1200), SPANISH_PUZZLE));
    let p = puzzle("puzzle-42");

    let tasks: Vec<_> = (0..5)
        .map(|i| {
            let service = h.service.clone();
            let p = p.clone();
            // Language spelling differs per caller but addresses the same slot.
            let language = if i % 2 == 0 { "Spanish" } else { " spanish" };
            tokio::spawn(async move { service.translate_puzzle(&p, Some(language)).await })
        })
        .collect();
    let results: Vec<_> = join_all(tasks).await.into_iter().map(Result::unwrap).collect();

    assert_eq!(h.provider.call_count(), 1);
    assert!(results.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(
        h.service.metrics_summary().counters.get(metric_names::COALESCED),
        Some(&4)
    );
}

#[tokio::test(start_paused = true)]
async fn followers_share_a_failed_outcome_and_nothing_is_cached() {
    let provider = MockProvider::scripted(
        Duration::from_millis(500),
        SPANISH_PUZZLE,
        vec![Err(UpstreamError::Status { status: 503, body: "overloaded".into() })],
    );
    let h = harness(provider);
    let p = puzzle("puzzle-42");

    let (a, b) = tokio::join!(
        h.service.translate_puzzle(&p, Some("Spanish")),
        h.service.translate_puzzle(&p, Some("Spanish")),
    );

    assert_eq!(h.provider.call_count(), 1);
    assert!(a.is_fallback() && b.is_fallback());
    assert_eq!(a.fields(), &p);
    assert_eq!(stored(&h.store, &p, "Spanish"), None);
    assert!(h.service.cache_stats().await.counts_by_language.is_empty());
}

#[tokio::test(start_paused = true)]
async fn distinct_keys_respect_the_global_rate_ceiling() {
    let h = harness(MockProvider::new(Duration::from_millis(100), SPANISH_PUZZLE));

    let tasks: Vec<_> = (0..4)
        .map(|i| {
            let service = h.service.clone();
            let p = puzzle(&format!("puzzle-{i}"));
            tokio::spawn(async move { service.translate_puzzle(&p, Some("Spanish")).await })
        })
        .collect();
    for result in join_all(tasks).await {
        assert!(!result.unwrap().is_fallback());
    }

    let calls = h.provider.calls();
    assert_eq!(calls.len(), 4);
    for pair in calls.windows(2) {
        assert!(pair[1] - pair[0] >= MIN_INTERVAL, "gap {:?}", pair[1] - pair[0]);
    }
}

#[tokio::test(start_paused = true)]
async fn repeated_rate_limits_fall_back_without_caching() {
    let rate_limited = || Err(UpstreamError::RateLimited { body: "quota exceeded".into() });
    let provider = MockProvider::scripted(
        Duration::from_millis(10),
        SPANISH_PUZZLE,
        vec![rate_limited(), rate_limited()],
    );
    let h = harness(provider);
    let p = puzzle("puzzle-42");

    let started = Instant::now();
    let result = h.service.translate_puzzle(&p, Some("French")).await;

    match result {
        TranslationResult::Fallback { original, reason } => {
            assert_eq!(original, p);
            assert!(matches!(
                reason,
                TranslateError::Upstream(UpstreamError::RateLimited { .. })
            ));
        }
        other => panic!("expected fallback, got {other:?}"),
    }
    assert_eq!(h.provider.call_count(), 2);
    assert!(Instant::now() - started >= COOLDOWN);
    assert_eq!(stored(&h.store, &p, "French"), None);
}

#[tokio::test(start_paused = true)]
async fn source_language_and_absent_language_pass_through() {
    let h = harness(MockProvider::new(Duration::from_millis(10), SPANISH_PUZZLE));
    let p = puzzle("puzzle-42");

    for language in [None, Some(""), Some("   "), Some("English"), Some(" ENGLISH ")] {
        let result = h.service.translate_puzzle(&p, language).await;
        assert_eq!(result, TranslationResult::Translated(p.clone()));
    }
    assert_eq!(h.provider.call_count(), 0);
    assert!(h.service.cache_stats().await.counts_by_language.is_empty());
}

#[tokio::test(start_paused = true)]
async fn untranslated_cache_entry_heals_itself() {
    let h = harness(MockProvider::new(Duration::from_millis(10), SPANISH_PUZZLE));
    let p = puzzle("puzzle-42");
    let key = CacheKey::for_unit(&p, "Spanish");
    h.store
        .put(&key, &json!({"title": p.title, "question": format!("{}  ", p.question)}))
        .unwrap();

    let healed = h.service.translate_puzzle(&p, Some("Spanish")).await;
    assert_eq!(healed.fields().question, "¿Quién cruza primero?");
    assert_eq!(h.provider.call_count(), 1);
    assert_eq!(
        stored(&h.store, &p, "Spanish").unwrap()["question"],
        "¿Quién cruza primero?"
    );

    let again = h.service.translate_puzzle(&p, Some("Spanish")).await;
    assert_eq!(again, healed);
    assert_eq!(h.provider.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn partial_reply_keeps_original_fields() {
    let reply = "```json\n{\"briefing\": \"Un proveedor clave retira un lote de piezas.\", \
\"title\": \"\", \"evidence\": [\"Aviso de retirada\"]}\n```";
    let h = harness(MockProvider::new(Duration::from_millis(10), reply));
    let s = scenario();

    let result = h.service.translate_scenario(&s, Some("Spanish")).await;
    let fields = result.fields();
    assert!(!result.is_fallback());
    assert_eq!(fields.briefing, "Un proveedor clave retira un lote de piezas.");
    assert_eq!(fields.title, s.title);
    assert_eq!(fields.claim, s.claim);
    assert_eq!(fields.evidence, vec!["Aviso de retirada".to_string(), "Inventory report".to_string()]);
    assert_eq!(fields.stakeholders, s.stakeholders);
}

#[tokio::test(start_paused = true)]
async fn unparseable_reply_is_not_cached_and_is_retried_later() {
    let provider = MockProvider::scripted(
        Duration::from_millis(10),
        SPANISH_PUZZLE,
        vec![Ok("Sorry, I can't translate that.".into())],
    );
    let h = harness(provider);
    let p = puzzle("puzzle-42");

    let first = h.service.translate_puzzle(&p, Some("Spanish")).await;
    assert!(matches!(
        first,
        TranslationResult::Fallback { reason: TranslateError::Parse(_), .. }
    ));
    assert_eq!(stored(&h.store, &p, "Spanish"), None);

    let second = h.service.translate_puzzle(&p, Some("Spanish")).await;
    assert!(!second.is_fallback());
    assert_eq!(h.provider.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn batch_preserves_order_and_skips_cached_units() {
    let provider = MockProvider::scripted(
        Duration::from_millis(10),
        SPANISH_PUZZLE,
        vec![
            Ok(r#"{"question": "¿Primero?"}"#.into()),
            Ok(r#"{"question": "¿Tercero?"}"#.into()),
        ],
    );
    let h = harness(provider);
    let units = vec![puzzle("p1"), puzzle("p2"), puzzle("p3")];
    h.store
        .put(&CacheKey::for_unit(&units[1], "spanish"), &json!({"question": "¿Segundo?"}))
        .unwrap();

    let results = h.service.translate_batch(&units, Some("Spanish")).await;

    let questions: Vec<_> = results.iter().map(|r| r.fields().question.as_str()).collect();
    assert_eq!(questions, ["¿Primero?", "¿Segundo?", "¿Tercero?"]);
    let ids: Vec<_> = results.iter().map(|r| r.fields().id.as_str()).collect();
    assert_eq!(ids, ["p1", "p2", "p3"]);
    assert_eq!(h.provider.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn batch_failures_stay_local_to_their_unit() {
    let provider = MockProvider::scripted(
        Duration::from_millis(10),
        SPANISH_PUZZLE,
        vec![Err(UpstreamError::Status { status: 500, body: "boom".into() })],
    );
    let h = harness(provider);
    let units = vec![puzzle("p1"), puzzle("p2")];

    let results = h.service.translate_batch(&units, Some("Spanish")).await;

    assert!(results[0].is_fallback());
    assert_eq!(results[0].fields(), &units[0]);
    assert!(!results[1].is_fallback());
    assert_eq!(results[1].fields().id, "p2");
}

#[tokio::test(start_paused = true)]
async fn feedback_lives_only_in_the_volatile_tier() {
    let h = harness(MockProvider::new(Duration::from_millis(10), "¡Bien hecho!"));
    let feedback = Feedback::Text("Well done!".into());

    let first = h.service.translate_feedback(&feedback, Some("Spanish")).await;
    assert_eq!(first, TranslationResult::Translated(Feedback::Text("¡Bien hecho!".into())));

    let stats = h.service.cache_stats().await;
    assert!(stats.counts_by_language.is_empty());
    assert_eq!(stats.volatile_entries, 1);

    let second = h.service.translate_feedback(&feedback, Some("spanish")).await;
    assert_eq!(second, first);
    assert_eq!(h.provider.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn invalidate_forces_a_fresh_translation() {
    let h = harness(MockProvider::new(Duration::from_millis(10), SPANISH_PUZZLE));
    let p = puzzle("puzzle-42");

    h.service.translate_puzzle(&p, Some("Spanish")).await;
    assert!(h.service.invalidate(&p, "Spanish").await);
    assert!(!h.service.invalidate(&p, "Spanish").await);
    assert_eq!(stored(&h.store, &p, "Spanish"), None);

    h.service.translate_puzzle(&p, Some("Spanish")).await;
    assert_eq!(h.provider.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn shutdown_turns_outstanding_work_into_fallbacks() {
    let h = harness(MockProvider::new(Duration::from_secs(20), SPANISH_PUZZLE));
    let p = puzzle("puzzle-42");

    let service = h.service.clone();
    let task = {
        let p = p.clone();
        tokio::spawn(async move { service.translate_puzzle(&p, Some("Spanish")).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.service.pending_requests(), 1);
    h.service.shutdown();

    let result = task.await.unwrap();
    assert_eq!(
        result,
        TranslationResult::Fallback {
            original: p.clone(),
            reason: TranslateError::Upstream(UpstreamError::Cancelled),
        }
    );
    assert_eq!(stored(&h.store, &p, "Spanish"), None);
    assert_eq!(h.service.pending_requests(), 0);
}

#[tokio::test(start_paused = true)]
async fn no_upstream_call_after_shutdown() {
    for _ in 0..20 {
        let h = harness(MockProvider::new(Duration::from_millis(10), SPANISH_PUZZLE));
        let p = puzzle("puzzle-42");
        h.service.shutdown();

        let result = h.service.translate_puzzle(&p, Some("Spanish")).await;

        assert!(matches!(
            result,
            TranslationResult::Fallback {
                reason: TranslateError::Upstream(UpstreamError::Cancelled),
                ..
            }
        ));
        assert_eq!(h.provider.call_count(), 0);
        assert_eq!(h.service.pending_requests(), 0);
    }
}

#[tokio::test(start_paused = true)]
async fn timed_out_call_falls_back_and_keeps_its_throttle_slot() {
    let h = harness_with_timeout(
        MockProvider::new(Duration::from_secs(10), SPANISH_PUZZLE),
        Duration::from_secs(1),
    );
    let first = puzzle("puzzle-1");
    let second = puzzle("puzzle-2");

    let result = h.service.translate_puzzle(&first, Some("Spanish")).await;
    assert_eq!(
        result,
        TranslationResult::Fallback {
            original: first.clone(),
            reason: TranslateError::Upstream(UpstreamError::Timeout),
        }
    );
    assert_eq!(h.service.pending_requests(), 0);
    assert_eq!(stored(&h.store, &first, "Spanish"), None);

    h.service.translate_puzzle(&second, Some("Spanish")).await;
    let calls = h.provider.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[1] - calls[0] >= MIN_INTERVAL, "gap {:?}", calls[1] - calls[0]);
}

#[tokio::test(start_paused = true)]
async fn structured_feedback_reply_without_text_is_a_fallback() {
    let h = harness(MockProvider::new(Duration::from_millis(10), "```json\n{}\n```"));
    let feedback = Feedback::Structured(json!({
        "summary": "Good reasoning",
        "tip": "Slow down"
    }));

    let first = h.service.translate_feedback(&feedback, Some("Spanish")).await;
    assert!(matches!(
        first,
        TranslationResult::Fallback { reason: TranslateError::Parse(_), .. }
    ));
    assert_eq!(first.fields(), &feedback);
    assert_eq!(h.service.cache_stats().await.volatile_entries, 0);

    let second = h.service.translate_feedback(&feedback, Some("Spanish")).await;
    assert!(second.is_fallback());
    assert_eq!(h.provider.call_count(), 2);
}

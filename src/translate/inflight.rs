//! In-flight request table for coalescing duplicate translations.
//!
//! The first caller for a key becomes the leader and receives a
//! `Completion`; later callers get a receiver on the same watch channel.
//! Check-then-insert happens under one lock, so exactly one leader exists per
//! key at a time. The entry is removed the moment the outcome is published,
//! before anyone is woken.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::watch;
use tracing::warn;

use super::CacheKey;
use crate::error::TranslateError;

/// Shared outcome of one upstream translation: the parsed cache entry or the
/// reason it failed.
pub type Outcome = Result<Value, TranslateError>;

type OutcomeRx = watch::Receiver<Option<Outcome>>;

#[derive(Default)]
pub struct InFlightTable {
    table: Mutex<HashMap<CacheKey, OutcomeRx>>,
}

impl InFlightTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to the outcome for `key`. Returns a `Completion` when the
    /// caller is the leader and must produce the outcome.
    pub fn join_or_start(self: &Arc<Self>, key: &CacheKey) -> (Waiter, Option<Completion>) {
        let mut table = self.table.lock();
        if let Some(rx) = table.get(key) {
            return (Waiter { rx: rx.clone() }, None);
        }
        let (tx, rx) = watch::channel(None);
        table.insert(key.clone(), rx.clone());
        let completion = Completion {
            table: Arc::clone(self),
            key: key.clone(),
            tx: Some(tx),
        };
        (Waiter { rx }, Some(completion))
    }

    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.table.lock().contains_key(key)
    }

    fn finish(&self, key: &CacheKey, tx: watch::Sender<Option<Outcome>>, outcome: Outcome) {
        self.table.lock().remove(key);
        tx.send_replace(Some(outcome));
    }
}

/// Leader handle. Publishing (or dropping) it releases the key.
pub struct Completion {
    table: Arc<InFlightTable>,
    key: CacheKey,
    tx: Option<watch::Sender<Option<Outcome>>>,
}

impl Completion {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn complete(mut self, outcome: Outcome) {
        if let Some(tx) = self.tx.take() {
            self.table.finish(&self.key, tx, outcome);
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            warn!(key = %self.key, "in-flight translation dropped without an outcome");
            self.table.finish(&self.key, tx, Err(TranslateError::Aborted));
        }
    }
}

/// Receives the single outcome published for a key.
pub struct Waiter {
    rx: OutcomeRx,
}

impl Waiter {
    pub async fn outcome(mut self) -> Outcome {
        match self.rx.wait_for(Option::is_some).await {
            Ok(value) => value.clone().unwrap_or(Err(TranslateError::Aborted)),
            Err(_) => Err(TranslateError::Aborted),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UpstreamError;
    use crate::translate::ContentKind;

    fn key() -> CacheKey {
        CacheKey::new(ContentKind::Puzzle, "puzzle-42", "Spanish")
    }

    #[tokio::test]
    async fn one_leader_many_followers_same_outcome() {
        let table = Arc::new(InFlightTable::new());
        let (leader_wait, completion) = table.join_or_start(&key());
        let completion = completion.expect("first caller leads");
        let (follower_wait, none) = table.join_or_start(&key());
        assert!(none.is_none());
        assert!(table.contains(&key()));

        completion.complete(Ok(serde_json::json!({"question": "¿Quién?"})));
        assert!(table.is_empty());

        let a = leader_wait.outcome().await;
        let b = follower_wait.outcome().await;
        assert_eq!(a, b);
        assert_eq!(a.unwrap()["question"], "¿Quién?");
    }

    #[tokio::test]
    async fn key_is_released_after_failure() {
        let table = Arc::new(InFlightTable::new());
        let (wait, completion) = table.join_or_start(&key());
        completion
            .unwrap()
            .complete(Err(TranslateError::Upstream(UpstreamError::Timeout)));
        assert!(wait.outcome().await.is_err());

        let (_, completion) = table.join_or_start(&key());
        assert!(completion.is_some(), "next caller starts a fresh request");
    }

    #[tokio::test]
    async fn dropped_leader_releases_waiters() {
        let table = Arc::new(InFlightTable::new());
        let (wait, completion) = table.join_or_start(&key());
        drop(completion);
        assert_eq!(wait.outcome().await, Err(TranslateError::Aborted));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn distinct_keys_do_not_coalesce() {
        let table = Arc::new(InFlightTable::new());
        let (_, a) = table.join_or_start(&key());
        let (_, b) = table.join_or_start(&CacheKey::new(ContentKind::Puzzle, "puzzle-42", "French"));
        assert!(a.is_some() && b.is_some());
        assert_eq!(table.len(), 2);
    }
}

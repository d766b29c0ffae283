//! Two-tier translation cache.
//!
//! Durable tier: shared store of record for puzzle and scenario content.
//! Its failures never reach the caller: a failed read is a miss, a failed
//! write is logged and dropped.
//! Volatile tier: in-process LRU for feedback, lost on restart.
//!
//! Entries are opaque JSON field sets; there is no TTL. Entries leave only
//! through `invalidate` or by being overwritten.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::{CacheKey, Tier};
use crate::error::CacheError;

/// Shared persistent store. Writes are idempotent upserts.
pub trait DurableStore: Send + Sync {
    fn get(&self, key: &CacheKey) -> Result<Option<Value>, CacheError>;
    fn put(&self, key: &CacheKey, entry: &Value) -> Result<(), CacheError>;
    fn remove(&self, key: &CacheKey) -> Result<bool, CacheError>;
    fn counts_by_language(&self) -> Result<BTreeMap<String, u64>, CacheError>;
}

/// Process-local LRU tier.
pub struct VolatileCache {
    inner: Mutex<LruCache<CacheKey, Value>>,
}

impl VolatileCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<Value> {
        self.inner.lock().get(key).cloned()
    }

    pub fn insert(&self, key: CacheKey, entry: Value) {
        self.inner.lock().put(key, entry);
    }

    pub fn remove(&self, key: &CacheKey) -> bool {
        self.inner.lock().pop(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Observability snapshot of both tiers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub counts_by_language: BTreeMap<String, u64>,
    pub volatile_entries: usize,
}

pub struct TranslationCache {
    durable: Arc<dyn DurableStore>,
    volatile: VolatileCache,
}

impl TranslationCache {
    pub fn new(durable: Arc<dyn DurableStore>, volatile_capacity: usize) -> Self {
        Self {
            durable,
            volatile: VolatileCache::new(volatile_capacity),
        }
    }

    /// Run a durable-tier operation on the blocking pool; store I/O is
    /// synchronous and must stay off the async workers.
    async fn on_durable<R, F>(&self, op: F) -> Result<R, CacheError>
    where
        R: Send + 'static,
        F: FnOnce(&dyn DurableStore) -> Result<R, CacheError> + Send + 'static,
    {
        let durable = Arc::clone(&self.durable);
        tokio::task::spawn_blocking(move || op(durable.as_ref()))
            .await
            .map_err(|e| CacheError::Task(e.to_string()))?
    }

    /// Look up `key` in the tier that owns its content kind.
    pub async fn get(&self, key: &CacheKey) -> Option<Value> {
        match key.kind.tier() {
            Tier::Durable => {
                let k = key.clone();
                match self.on_durable(move |store| store.get(&k)).await {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!(key = %key, error = %e, "durable cache read failed, treating as miss");
                        None
                    }
                }
            }
            Tier::Volatile => self.volatile.get(key),
        }
    }

    /// Store a translated entry. Only successful translations reach here.
    pub async fn put(&self, key: &CacheKey, entry: Value) {
        match key.kind.tier() {
            Tier::Durable => {
                let k = key.clone();
                match self.on_durable(move |store| store.put(&k, &entry)).await {
                    Ok(()) => debug!(key = %key, "durable cache write"),
                    Err(e) => {
                        warn!(key = %key, error = %e, "durable cache write failed, result not persisted")
                    }
                }
            }
            Tier::Volatile => self.volatile.insert(key.clone(), entry),
        }
    }

    /// Drop the slot for `key`. Returns whether something was removed.
    pub async fn invalidate(&self, key: &CacheKey) -> bool {
        match key.kind.tier() {
            Tier::Durable => {
                let k = key.clone();
                self.on_durable(move |store| store.remove(&k))
                    .await
                    .unwrap_or_else(|e| {
                        warn!(key = %key, error = %e, "durable cache delete failed");
                        false
                    })
            }
            Tier::Volatile => self.volatile.remove(key),
        }
    }

    pub async fn stats(&self) -> CacheStats {
        let counts_by_language = self
            .on_durable(|store| store.counts_by_language())
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "durable cache stats unavailable");
                BTreeMap::new()
            });
        CacheStats {
            counts_by_language,
            volatile_entries: self.volatile.len(),
        }
    }
}

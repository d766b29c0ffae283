//! Durable translation tier backed by SQLite.
//! One row per (content kind, content id, language); writes are upserts that
//! bump `updated_at`. No expiry.

use std::collections::BTreeMap;
use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use tracing::{debug, info};

use super::cache::DurableStore;
use super::CacheKey;
use crate::error::CacheError;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS translation_cache (
        content_kind TEXT NOT NULL,
        content_id TEXT NOT NULL,
        language TEXT NOT NULL,
        fields TEXT NOT NULL,
        updated_at INTEGER NOT NULL,
        PRIMARY KEY (content_kind, content_id, language)
    );
    CREATE INDEX IF NOT EXISTS idx_translation_cache_language
        ON translation_cache(language);";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the cache database at the given path.
    pub fn open(db_path: &Path) -> Result<Self, CacheError> {
        let conn = Connection::open(db_path)?;
        // WAL mode for better concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        conn.execute_batch(SCHEMA)?;
        info!(path = %db_path.display(), "durable translation cache opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Last write time (unix seconds) of the slot, if present.
    pub fn updated_at(&self, key: &CacheKey) -> Result<Option<i64>, CacheError> {
        let conn = self.conn.lock();
        let ts = conn
            .query_row(
                "SELECT updated_at FROM translation_cache
                 WHERE content_kind = ?1 AND content_id = ?2 AND language = ?3",
                params![key.kind.as_str(), key.content_id, key.language],
                |row| row.get(0),
            )
            .optional()?;
        Ok(ts)
    }
}

impl DurableStore for SqliteStore {
    fn get(&self, key: &CacheKey) -> Result<Option<Value>, CacheError> {
        let conn = self.conn.lock();
        let fields: Option<String> = conn
            .query_row(
                "SELECT fields FROM translation_cache
                 WHERE content_kind = ?1 AND content_id = ?2 AND language = ?3",
                params![key.kind.as_str(), key.content_id, key.language],
                |row| row.get(0),
            )
            .optional()?;
        match fields {
            Some(text) => {
                debug!(key = %key, "durable cache hit");
                Ok(Some(serde_json::from_str(&text)?))
            }
            None => Ok(None),
        }
    }

    fn put(&self, key: &CacheKey, entry: &Value) -> Result<(), CacheError> {
        let fields = serde_json::to_string(entry)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO translation_cache
             (content_kind, content_id, language, fields, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(content_kind, content_id, language)
             DO UPDATE SET fields = excluded.fields, updated_at = excluded.updated_at",
            params![key.kind.as_str(), key.content_id, key.language, fields, now_unix()],
        )?;
        Ok(())
    }

    fn remove(&self, key: &CacheKey) -> Result<bool, CacheError> {
        let conn = self.conn.lock();
        let removed = conn.execute(
            "DELETE FROM translation_cache
             WHERE content_kind = ?1 AND content_id = ?2 AND language = ?3",
            params![key.kind.as_str(), key.content_id, key.language],
        )?;
        Ok(removed > 0)
    }

    fn counts_by_language(&self) -> Result<BTreeMap<String, u64>, CacheError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT language, COUNT(*) FROM translation_cache GROUP BY language",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        let mut counts = BTreeMap::new();
        for row in rows {
            let (language, count) = row?;
            counts.insert(language, count.max(0) as u64);
        }
        Ok(counts)
    }
}

/// Current time as Unix timestamp (seconds).
fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

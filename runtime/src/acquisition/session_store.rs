//! Session store: decides when session state is loaded, saved or dropped.
//!
//! Persistence goes through the `SessionBackend` key-value collaborator;
//! the store only cares about expiry and key discipline.

use crate::acquisition::http_session::SessionRecord;
use crate::error::StoreError;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Opaque key-value persistence for serialized session records.
pub trait SessionBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn put(&self, key: &str, value: &str) -> Result<(), StoreError>;
    /// Returns true if a value was removed.
    fn delete(&self, key: &str) -> Result<bool, StoreError>;
    fn keys(&self) -> Result<Vec<String>, StoreError>;
}

/// Process-local backend, lost on exit.
#[derive(Default)]
pub struct MemoryBackend {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let values = self.values.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(values.get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut values = self.values.lock().map_err(|_| StoreError::Poisoned)?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut values = self.values.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(values.remove(key).is_some())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let values = self.values.lock().map_err(|_| StoreError::Poisoned)?;
        let mut keys: Vec<String> = values.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

/// SQLite-backed session persistence.
pub struct SqliteBackend {
    db: Mutex<Connection>,
}

impl SqliteBackend {
    /// Open or create a session database.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let db = Connection::open(path)?;
        db.execute_batch(
            "CREATE TABLE IF NOT EXISTS sessions (
                source_key TEXT PRIMARY KEY,
                record TEXT NOT NULL,
                updated_at TEXT DEFAULT CURRENT_TIMESTAMP
            );",
        )?;
        Ok(Self { db: Mutex::new(db) })
    }

    /// Default location: ~/.spot-harvest/sessions.db.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".spot-harvest")
            .join("sessions.db")
    }
}

impl SessionBackend for SqliteBackend {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let db = self.db.lock().map_err(|_| StoreError::Poisoned)?;
        let result = db.query_row(
            "SELECT record FROM sessions WHERE source_key = ?1",
            rusqlite::params![key],
            |row| row.get::<_, String>(0),
        );
        match result {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let db = self.db.lock().map_err(|_| StoreError::Poisoned)?;
        db.execute(
            "INSERT OR REPLACE INTO sessions (source_key, record, updated_at)
             VALUES (?1, ?2, CURRENT_TIMESTAMP)",
            rusqlite::params![key, value],
        )?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let db = self.db.lock().map_err(|_| StoreError::Poisoned)?;
        let rows = db.execute(
            "DELETE FROM sessions WHERE source_key = ?1",
            rusqlite::params![key],
        )?;
        Ok(rows > 0)
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let db = self.db.lock().map_err(|_| StoreError::Poisoned)?;
        let mut stmt = db.prepare("SELECT source_key FROM sessions ORDER BY source_key")?;
        let keys = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(keys)
    }
}

/// Summary of a stored session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub source_key: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub remaining_hours: f64,
    pub cookie_count: usize,
    pub is_valid: bool,
}

/// Load/save/invalidate with TTL and one exclusive section per source key.
pub struct SessionStore {
    backend: Arc<dyn SessionBackend>,
    ttl: chrono::Duration,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn SessionBackend>, ttl: chrono::Duration) -> Self {
        Self {
            backend,
            ttl,
            locks: DashMap::new(),
        }
    }

    /// In-memory store, for tests and one-shot runs.
    pub fn in_memory(ttl: chrono::Duration) -> Self {
        Self::new(Arc::new(MemoryBackend::new()), ttl)
    }

    fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        if let Some(l) = self.locks.get(key) {
            return Arc::clone(l.value());
        }
        Arc::clone(
            self.locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }

    fn read(&self, key: &str) -> Result<Option<SessionRecord>, StoreError> {
        match self.backend.get(key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Load the record for `key`. Expired records are deleted and reported absent.
    pub fn load(&self, key: &str) -> Result<Option<SessionRecord>, StoreError> {
        let lock = self.key_lock(key);
        let _guard = lock.lock().map_err(|_| StoreError::Poisoned)?;

        let Some(record) = self.read(key)? else {
            return Ok(None);
        };
        if record.source_key != key {
            warn!(source = key, stored = %record.source_key, "dropping session stored under wrong key");
            self.backend.delete(key)?;
            return Ok(None);
        }
        if record.is_expired(self.ttl) {
            info!(source = key, "session expired");
            self.backend.delete(key)?;
            return Ok(None);
        }
        Ok(Some(record))
    }

    /// Persist `record` under `key`. The record must belong to `key`.
    pub fn save(&self, key: &str, record: &SessionRecord) -> Result<(), StoreError> {
        if record.source_key != key {
            return Err(StoreError::KeyMismatch {
                key: key.to_string(),
                record: record.source_key.clone(),
            });
        }
        let lock = self.key_lock(key);
        let _guard = lock.lock().map_err(|_| StoreError::Poisoned)?;
        let raw = serde_json::to_string(record)?;
        self.backend.put(key, &raw)?;
        debug!(source = key, cookies = record.cookies.len(), "session saved");
        Ok(())
    }

    /// Drop the session for `key`, e.g. after an auth failure.
    pub fn invalidate(&self, key: &str) -> Result<bool, StoreError> {
        let lock = self.key_lock(key);
        let _guard = lock.lock().map_err(|_| StoreError::Poisoned)?;
        let removed = self.backend.delete(key)?;
        if removed {
            info!(source = key, "session invalidated");
        }
        Ok(removed)
    }

    /// Refresh `last_updated` and merge new cookies in one section.
    ///
    /// Creates the record if none exists and `cookies` is non-empty.
    pub fn refresh(
        &self,
        key: &str,
        cookies: &[(String, String)],
    ) -> Result<Option<SessionRecord>, StoreError> {
        let lock = self.key_lock(key);
        let _guard = lock.lock().map_err(|_| StoreError::Poisoned)?;

        let existing = self
            .read(key)?
            .filter(|r| r.source_key == key && !r.is_expired(self.ttl));
        let mut record = match existing {
            Some(r) => r,
            None if cookies.is_empty() => return Ok(None),
            None => {
                info!(source = key, "session created");
                SessionRecord::new(key)
            }
        };
        record.absorb_cookies(cookies);
        record.touch();
        self.backend.put(key, &serde_json::to_string(&record)?)?;
        Ok(Some(record))
    }

    pub fn info(&self, key: &str) -> Result<Option<SessionInfo>, StoreError> {
        let Some(record) = self.read(key)? else {
            return Ok(None);
        };
        let now = Utc::now();
        let idle_expiry = record.last_updated + self.ttl;
        let expires_at = record
            .expires_at
            .map_or(idle_expiry, |e| e.min(idle_expiry));
        let remaining = expires_at - now;
        Ok(Some(SessionInfo {
            source_key: record.source_key.clone(),
            created_at: record.created_at,
            last_updated: record.last_updated,
            expires_at,
            remaining_hours: remaining.num_seconds() as f64 / 3600.0,
            cookie_count: record.cookies.len(),
            is_valid: !record.is_expired_at(now, self.ttl),
        }))
    }

    pub fn list(&self) -> Result<Vec<String>, StoreError> {
        self.backend.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record_with_cookie(key: &str) -> SessionRecord {
        let mut r = SessionRecord::new(key);
        r.add_cookie("sid", "abc");
        r
    }

    #[test]
    fn test_save_and_load() {
        let store = SessionStore::in_memory(Duration::hours(24));
        store.save("reddit", &record_with_cookie("reddit")).unwrap();

        let loaded = store.load("reddit").unwrap().unwrap();
        assert_eq!(loaded.cookie_header(), "sid=abc");
        assert!(store.load("instagram").unwrap().is_none());
    }

    #[test]
    fn test_expired_session_is_absent_and_deleted() {
        let store = SessionStore::in_memory(Duration::hours(24));
        let mut r = record_with_cookie("forum");
        r.last_updated = Utc::now() - Duration::hours(25);
        store.save("forum", &r).unwrap();

        assert!(store.load("forum").unwrap().is_none());
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_save_rejects_foreign_record() {
        let store = SessionStore::in_memory(Duration::hours(24));
        let err = store.save("reddit", &record_with_cookie("instagram")).unwrap_err();
        assert!(matches!(err, StoreError::KeyMismatch { .. }));
    }

    #[test]
    fn test_invalidate() {
        let store = SessionStore::in_memory(Duration::hours(24));
        store.save("reddit", &record_with_cookie("reddit")).unwrap();
        assert!(store.invalidate("reddit").unwrap());
        assert!(!store.invalidate("reddit").unwrap());
        assert!(store.load("reddit").unwrap().is_none());
    }

    #[test]
    fn test_refresh_creates_only_with_cookies() {
        let store = SessionStore::in_memory(Duration::hours(24));
        assert!(store.refresh("forum", &[]).unwrap().is_none());

        let created = store
            .refresh("forum", &[("sid".to_string(), "1".to_string())])
            .unwrap()
            .unwrap();
        assert_eq!(created.source_key, "forum");

        let refreshed = store.refresh("forum", &[]).unwrap().unwrap();
        assert!(refreshed.last_updated >= created.last_updated);
        assert_eq!(refreshed.cookies.len(), 1);
    }

    #[test]
    fn test_sqlite_backend_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.db");
        {
            let store = SessionStore::new(
                Arc::new(SqliteBackend::open(&path).unwrap()),
                Duration::hours(24),
            );
            store.save("instagram", &record_with_cookie("instagram")).unwrap();
        }

        // A later run sees the same session.
        let store = SessionStore::new(
            Arc::new(SqliteBackend::open(&path).unwrap()),
            Duration::hours(24),
        );
        let loaded = store.load("instagram").unwrap().unwrap();
        assert_eq!(loaded.cookies.get("sid").map(String::as_str), Some("abc"));
        assert_eq!(store.list().unwrap(), vec!["instagram".to_string()]);

        let info = store.info("instagram").unwrap().unwrap();
        assert!(info.is_valid);
        assert_eq!(info.cookie_count, 1);
        assert!(info.remaining_hours > 23.0);
    }
}

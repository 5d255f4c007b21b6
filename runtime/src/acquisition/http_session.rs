//! Session records for authenticated sources.
//!
//! A `SessionRecord` stores the cookies and auth headers captured for one
//! source key. It is applied only to requests for that same key.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Persisted authentication state for a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Source key the cookies were captured for.
    pub source_key: String,
    /// Session cookies (name -> value).
    pub cookies: HashMap<String, String>,
    /// Extra headers to send (header-name -> value).
    pub headers: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    /// Refreshed on every reuse.
    pub last_updated: DateTime<Utc>,
    /// Hard expiry announced by the remote, if any.
    pub expires_at: Option<DateTime<Utc>>,
    /// Free-form caller state (e.g. the account name used).
    #[serde(default)]
    pub state: HashMap<String, String>,
}

impl SessionRecord {
    /// Create an empty record for `source_key`, stamped now.
    pub fn new(source_key: &str) -> Self {
        let now = Utc::now();
        Self {
            source_key: source_key.to_string(),
            cookies: HashMap::new(),
            headers: HashMap::new(),
            created_at: now,
            last_updated: now,
            expires_at: None,
            state: HashMap::new(),
        }
    }

    /// Format cookies as a `Cookie` header value.
    ///
    /// Returns a string like `name1=val1; name2=val2`, sorted by name.
    pub fn cookie_header(&self) -> String {
        let mut pairs: Vec<_> = self.cookies.iter().collect();
        pairs.sort_by_key(|(k, _)| (*k).clone());
        pairs
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Expired when idle longer than `ttl` or past the explicit expiry.
    pub fn is_expired_at(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        if let Some(expires) = self.expires_at {
            if now >= expires {
                return true;
            }
        }
        now - self.last_updated > ttl
    }

    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.is_expired_at(Utc::now(), ttl)
    }

    /// Mark the record as just used.
    pub fn touch(&mut self) {
        self.last_updated = Utc::now();
    }

    pub fn add_cookie(&mut self, name: &str, value: &str) {
        self.cookies.insert(name.to_string(), value.to_string());
    }

    pub fn add_header(&mut self, name: &str, value: &str) {
        self.headers.insert(name.to_string(), value.to_string());
    }

    /// Merge cookies from `Set-Cookie` pairs. Returns true if anything changed.
    pub fn absorb_cookies(&mut self, cookies: &[(String, String)]) -> bool {
        let mut changed = false;
        for (name, value) in cookies {
            if self.cookies.get(name) != Some(value) {
                self.cookies.insert(name.clone(), value.clone());
                changed = true;
            }
        }
        changed
    }
}

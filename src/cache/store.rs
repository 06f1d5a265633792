use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use parking_lot::RwLock;
use thiserror::Error;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Images,
    Bodies,
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Namespace::Images => write!(f, "images"),
            Namespace::Bodies => write!(f, "bodies"),
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CacheError {
    #[error("Not cached: {namespace}/{key}")]
    NotFound { namespace: Namespace, key: String },

    #[error("Already cached: {namespace}/{key}")]
    AlreadyPresent { namespace: Namespace, key: String },
}

#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub data: T,
    pub expires_at: Instant,
}

impl<T: Clone> CacheEntry<T> {
    pub fn new(data: T, ttl: Duration) -> Self {
        Self {
            data,
            expires_at: Instant::now() + ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    pub fn expires_in(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }
}

/// Expiring map where a live key is write-once.
///
/// Expired entries are invisible to readers straight away; they only leave
/// the map on the next write to the same key or on [`TtlStore::purge_expired`].
pub struct TtlStore<T> {
    namespace: Namespace,
    entries: RwLock<HashMap<String, CacheEntry<T>>>,
}

impl<T: Clone> TtlStore<T> {
    pub fn new(namespace: Namespace) -> Self {
        Self {
            namespace,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Inserts `data` under `key` unless a live entry already holds it.
    pub fn insert(&self, key: &str, data: T, ttl: Duration) -> Result<(), CacheError> {
        let mut entries = self.entries.write();

        if let Some(entry) = entries.get(key) {
            if !entry.is_expired() {
                return Err(CacheError::AlreadyPresent {
                    namespace: self.namespace,
                    key: key.to_string(),
                });
            }
        }

        entries.insert(key.to_string(), CacheEntry::new(data, ttl));
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<T, CacheError> {
        let entries = self.entries.read();

        match entries.get(key) {
            Some(entry) if !entry.is_expired() => Ok(entry.data.clone()),
            _ => Err(CacheError::NotFound {
                namespace: self.namespace,
                key: key.to_string(),
            }),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        let entries = self.entries.read();
        entries.get(key).map_or(false, |entry| !entry.is_expired())
    }

    /// Remaining lifetime of a live entry.
    pub fn expires_in(&self, key: &str) -> Option<Duration> {
        let entries = self.entries.read();
        entries
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(CacheEntry::expires_in)
    }

    pub fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired());
        before - entries.len()
    }

    pub fn clear(&self) -> usize {
        let mut entries = self.entries.write();
        let removed = entries.len();
        entries.clear();
        removed
    }

    /// Physical size, expired entries included.
    pub fn entry_count(&self) -> usize {
        self.entries.read().len()
    }
}

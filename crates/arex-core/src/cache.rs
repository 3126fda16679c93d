//! Last-known-value cache shared between refresh loops and the scrape path.

use crate::{MetricSnapshot, ResourceKind};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Cache key: resource kind plus region. Globally scoped kinds use their
/// single configured region as the region component.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    kind: ResourceKind,
    region: String,
}

impl CacheKey {
    pub fn new(kind: ResourceKind, region: impl Into<String>) -> Self {
        Self {
            kind,
            region: region.into(),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn region(&self) -> &str {
        &self.region
    }
}

/// Record of the fetch attempts for one key.
#[derive(Debug, Clone, Default)]
pub struct CacheEntry {
    /// Last successful snapshot; `None` until the first success.
    pub snapshot: Option<MetricSnapshot>,
    /// When `snapshot` was fetched.
    pub fetched_at: Option<Instant>,
    /// Error from the most recent attempt; cleared on success.
    pub error: Option<String>,
}

impl CacheEntry {
    /// Whether the snapshot is older than the advisory TTL. Entries that have
    /// never succeeded count as stale.
    pub fn is_stale(&self, ttl: Duration) -> bool {
        match self.fetched_at {
            Some(at) => at.elapsed() > ttl,
            None => true,
        }
    }
}

/// Concurrency-safe map of [`CacheEntry`] values.
///
/// Each key has exactly one writer (its owning refresh loop) and any number
/// of readers (scrapes), so a `RwLock` around the map is enough; the lock is
/// held only to clone entries in or out, never across an await point. There
/// is no eviction: the TTL is advisory metadata, not an expiry mechanism,
/// since old data beats no data for monitoring.
#[derive(Debug, Default)]
pub struct MetricCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
}

impl MetricCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically replaces the snapshot for `key`, stamping the fetch time
    /// and clearing any error annotation.
    pub fn put(&self, key: CacheKey, snapshot: MetricSnapshot) {
        let mut entries = self.entries.write().unwrap();
        entries.insert(
            key,
            CacheEntry {
                snapshot: Some(snapshot),
                fetched_at: Some(Instant::now()),
                error: None,
            },
        );
    }

    /// Records a failed attempt without touching a previously stored
    /// snapshot. Creates an entry with no snapshot if the key is new.
    pub fn record_failure(&self, key: CacheKey, error: impl Into<String>) {
        let mut entries = self.entries.write().unwrap();
        let entry = entries.entry(key).or_default();
        entry.error = Some(error.into());
    }

    /// Most recently written entry for `key`, or `None` if never written.
    /// Never blocks on I/O, never fails.
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.entries.read().unwrap().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

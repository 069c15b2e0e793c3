//! Completed-execution cache.
//!
//! Maps a named query's identifier to the handle of its last successful
//! execution so repeated dashboard refreshes can skip re-running the query.
//! Entries live until they expire or the process exits.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use tracing::debug;

/// A cached execution of one named query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub query_name: String,
    pub work_group: String,
    pub execution_id: String,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    /// An entry is expired once its expiration instant is in the past.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// Concurrency-safe cache shared by every query handled by the process.
///
/// The entry map sits behind a single mutex that is never held across an
/// await. Executions of the same identifier are serialized through a
/// per-identifier async lock, see [`CacheStore::flight`].
pub struct CacheStore {
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
    flights: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl CacheStore {
    /// Creates an empty cache whose new entries live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
            flights: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the entry for `id`, expired or not.
    pub fn get(&self, id: &str) -> Option<CacheEntry> {
        self.entries.lock().get(id).cloned()
    }

    /// Returns the entry for `id` only if it has not expired.
    pub fn get_fresh(&self, id: &str) -> Option<CacheEntry> {
        let now = Utc::now();
        self.get(id).filter(|entry| !entry.is_expired_at(now))
    }

    /// Stores `entry` under `id`, replacing any previous entry.
    pub fn put(&self, id: &str, entry: CacheEntry) {
        self.entries.lock().insert(id.to_string(), entry);
    }

    /// Records a successful execution with a fresh expiration instant.
    pub fn record_execution(
        &self,
        id: &str,
        query_name: &str,
        work_group: &str,
        execution_id: &str,
    ) -> CacheEntry {
        let entry = CacheEntry {
            query_name: query_name.to_string(),
            work_group: work_group.to_string(),
            execution_id: execution_id.to_string(),
            expires_at: Utc::now() + self.ttl,
        };
        self.put(id, entry.clone());
        entry
    }

    /// Removes entries cached for (name, group) under an identifier other
    /// than `current_id`, left behind when a named query is recreated.
    pub fn reconcile(&self, query_name: &str, work_group: &str, current_id: &str) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|id, entry| {
            id == current_id || entry.query_name != query_name || entry.work_group != work_group
        });
        let removed = before - entries.len();
        if removed > 0 {
            debug!(query_name, work_group, removed, "Dropped orphaned cache entries");
        }
        removed
    }

    /// Removes every entry that has expired.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    /// Removes every entry whose expiration instant is strictly before `now`.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let removed = {
            let mut entries = self.entries.lock();
            let before = entries.len();
            entries.retain(|_, entry| !entry.is_expired_at(now));
            before - entries.len()
        };

        // Flight locks nobody is holding or waiting on can go too.
        self.flights
            .lock()
            .retain(|_, lock| Arc::strong_count(lock) > 1);

        if removed > 0 {
            debug!(removed, "Swept expired cache entries");
        }
        removed
    }

    /// Returns the execution lock for `id`.
    ///
    /// Holders of the lock are the only ones allowed to execute the named
    /// query; a waiter re-checks the cache after acquiring it, so concurrent
    /// misses for one identifier produce a single execution.
    pub fn flight(&self, id: &str) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(self.flights.lock().entry(id.to_string()).or_default())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

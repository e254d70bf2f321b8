//! Read-through cache with per-key load coalescing.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::debug;
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::CacheKey;
use crate::errors::Result;
use crate::utils::Clock;

/// A cached payload and the record version it was built from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub cache_key: String,
    pub payload: Arc<serde_json::Value>,
    pub ttl_expires_at: DateTime<Utc>,
    pub entity_version: i64,
}

impl CacheEntry {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.ttl_expires_at
    }
}

/// What a loader produces on a miss.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheFill {
    pub payload: serde_json::Value,
    pub entity_version: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub loads: u64,
    pub invalidations: u64,
    pub entries: usize,
    /// Percentage of lookups answered without a load, 0 when idle.
    pub hit_rate: f64,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
    invalidations: AtomicU64,
}

pub struct CacheLayer {
    entries: DashMap<CacheKey, CacheEntry>,
    /// Per-key population marker; holding the lock means "loading".
    loading: DashMap<CacheKey, Arc<Mutex<()>>>,
    /// Stamp of the last invalidation per key, so an in-flight load can tell
    /// it raced a write. Stamps come from `epoch` and are never reused.
    generations: DashMap<CacheKey, u64>,
    epoch: AtomicU64,
    clock: Arc<dyn Clock>,
    counters: Counters,
}

/// A caller's claim on a key's population marker. Dropping it, on any path
/// including cancellation, releases the lock and removes the marker once
/// nobody else holds it.
struct LoadSlot<'a> {
    cache: &'a CacheLayer,
    key: &'a CacheKey,
    marker: Arc<Mutex<()>>,
    held: Option<OwnedMutexGuard<()>>,
}

impl<'a> LoadSlot<'a> {
    fn join(cache: &'a CacheLayer, key: &'a CacheKey) -> Self {
        let marker = cache
            .loading
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        Self {
            cache,
            key,
            marker,
            held: None,
        }
    }

    async fn acquire(&mut self) {
        self.held = Some(self.marker.clone().lock_owned().await);
    }
}

impl Drop for LoadSlot<'_> {
    fn drop(&mut self) {
        self.held.take();
        // The map and this slot hold the remaining references.
        self.cache.loading.remove_if(self.key, |_, m| {
            Arc::ptr_eq(m, &self.marker) && Arc::strong_count(m) <= 2
        });
    }
}

impl CacheLayer {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            loading: DashMap::new(),
            generations: DashMap::new(),
            epoch: AtomicU64::new(0),
            clock,
            counters: Counters::default(),
        }
    }

    fn fresh_entry(&self, key: &CacheKey) -> Option<CacheEntry> {
        let now = self.clock.now();
        self.entries
            .get(key)
            .filter(|entry| entry.is_fresh(now))
            .map(|entry| entry.value().clone())
    }

    fn generation(&self, key: &CacheKey) -> u64 {
        self.generations.get(key).map(|g| *g.value()).unwrap_or(0)
    }

    /// Returns the cached value for `key`, loading it on a miss.
    ///
    /// A fresh entry is returned without calling `loader`. Concurrent misses
    /// for the same key run `loader` once; the others wait and reuse the
    /// result. `Ok(None)` from the loader means "nothing stored yet" and is
    /// not cached. A load that overlaps an invalidation of the same key is
    /// returned to its caller but not kept. Dropping the future mid-load
    /// releases the key for the next caller.
    pub async fn get_or_populate<F, Fut>(
        &self,
        key: &CacheKey,
        ttl: Duration,
        loader: F,
    ) -> Result<Option<CacheEntry>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<CacheFill>>>,
    {
        if let Some(entry) = self.fresh_entry(key) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Some(entry));
        }
        self.counters.misses.fetch_add(1, Ordering::Relaxed);

        let mut slot = LoadSlot::join(self, key);
        slot.acquire().await;

        // Someone else may have filled it while we waited.
        if let Some(entry) = self.fresh_entry(key) {
            return Ok(Some(entry));
        }

        let generation = self.generation(key);
        self.counters.loads.fetch_add(1, Ordering::Relaxed);
        let loaded = loader().await;

        match loaded {
            Ok(Some(fill)) => {
                let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
                let ttl_expires_at = self
                    .clock
                    .now()
                    .checked_add_signed(ttl)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC);
                let entry = CacheEntry {
                    cache_key: key.to_string(),
                    payload: Arc::new(fill.payload),
                    ttl_expires_at,
                    entity_version: fill.entity_version,
                };
                if self.generation(key) == generation {
                    self.entries.insert(key.clone(), entry.clone());
                } else {
                    debug!("Not caching {}: invalidated during load", key);
                }
                Ok(Some(entry))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn invalidate(&self, key: &CacheKey) {
        let stamp = self.epoch.fetch_add(1, Ordering::Relaxed) + 1;
        self.generations.insert(key.clone(), stamp);
        self.entries.remove(key);
        self.counters.invalidations.fetch_add(1, Ordering::Relaxed);
        debug!("Invalidated cache key {}", key);
    }

    pub fn invalidate_all<'a>(&self, keys: impl IntoIterator<Item = &'a CacheKey>) {
        for key in keys {
            self.invalidate(key);
        }
    }

    /// Looks at an entry without counting a hit or checking freshness.
    pub fn peek(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.entries.get(key).map(|e| e.value().clone())
    }

    /// Removes expired entries, and invalidation stamps of keys that are
    /// neither cached nor loading. Returns how many entries were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_fresh(now));
        let dropped = before - self.entries.len();

        // A load that starts after this check sees stamp 0 going in and out;
        // one already running sees its stamp vanish and skips the insert.
        self.generations
            .retain(|key, _| self.entries.contains_key(key) || self.loading.contains_key(key));
        dropped
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.counters.hits.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        CacheStats {
            hits,
            misses,
            loads: self.counters.loads.load(Ordering::Relaxed),
            invalidations: self.counters.invalidations.load(Ordering::Relaxed),
            entries: self.entries.len(),
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64 * 100.0
            },
        }
    }
}

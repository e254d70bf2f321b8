//! Read path used by the external API: cache first, Store on miss.

use std::sync::Arc;

use super::{CacheEntry, CacheFill, CacheKey, CacheLayer, TtlPolicy};
use crate::errors::Result;
use crate::records::EntityType;
use crate::store::RecordStore;

pub const DEFAULT_FEED_LIMIT: usize = 30;

pub struct CachedRecordReader {
    store: Arc<dyn RecordStore>,
    cache: Arc<CacheLayer>,
    ttl: TtlPolicy,
    feed_limit: usize,
}

impl CachedRecordReader {
    pub fn new(store: Arc<dyn RecordStore>, cache: Arc<CacheLayer>, ttl: TtlPolicy) -> Self {
        Self {
            store,
            cache,
            ttl,
            feed_limit: DEFAULT_FEED_LIMIT,
        }
    }

    pub fn with_feed_limit(mut self, limit: usize) -> Self {
        self.feed_limit = limit;
        self
    }

    /// One record as JSON, or `None` if it was never stored.
    pub async fn record(
        &self,
        entity_type: EntityType,
        entity_key: &str,
    ) -> Result<Option<CacheEntry>> {
        let key = CacheKey::detail(entity_type, entity_key);
        let store = self.store.clone();
        self.cache
            .get_or_populate(&key, self.ttl.ttl_for(entity_type), || async move {
                match store.get(entity_type, entity_key).await? {
                    Some(record) => Ok(Some(CacheFill {
                        entity_version: record.version,
                        payload: serde_json::to_value(&record)?,
                    })),
                    None => Ok(None),
                }
            })
            .await
    }

    /// Latest records of one type for a ticker as a JSON array.
    pub async fn ticker_feed(
        &self,
        entity_type: EntityType,
        ticker: &str,
    ) -> Result<Option<CacheEntry>> {
        let key = CacheKey::ticker_feed(entity_type, ticker);
        let store = self.store.clone();
        let limit = self.feed_limit;
        self.cache
            .get_or_populate(&key, self.ttl.ttl_for(entity_type), || async move {
                let records = store.list_by_ticker(entity_type, ticker, limit).await?;
                if records.is_empty() {
                    return Ok(None);
                }
                let entity_version = records.iter().map(|r| r.version).max().unwrap_or(0);
                Ok(Some(CacheFill {
                    payload: serde_json::to_value(&records)?,
                    entity_version,
                }))
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{CanonicalRecord, Fundamentals, RecordPayload};
    use crate::store::{HistoryRange, InMemoryRecordStore, UpsertOutcome};
    use crate::utils::ManualClock;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts reads so tests can tell whether the cache went to the store.
    struct CountingStore {
        inner: InMemoryRecordStore,
        reads: AtomicUsize,
    }

    #[async_trait]
    impl RecordStore for CountingStore {
        async fn upsert(&self, record: &CanonicalRecord) -> Result<UpsertOutcome> {
            self.inner.upsert(record).await
        }

        async fn get(
            &self,
            entity_type: EntityType,
            entity_key: &str,
        ) -> Result<Option<CanonicalRecord>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.get(entity_type, entity_key).await
        }

        async fn get_history(
            &self,
            entity_type: EntityType,
            entity_key: &str,
            range: &HistoryRange,
        ) -> Result<Vec<CanonicalRecord>> {
            self.inner.get_history(entity_type, entity_key, range).await
        }

        async fn list_by_ticker(
            &self,
            entity_type: EntityType,
            ticker: &str,
            limit: usize,
        ) -> Result<Vec<CanonicalRecord>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.list_by_ticker(entity_type, ticker, limit).await
        }

        async fn prune(
            &self,
            entity_type: EntityType,
            older_than: chrono::DateTime<Utc>,
        ) -> Result<crate::store::Pruned> {
            self.inner.prune(entity_type, older_than).await
        }

        async fn max_version(&self) -> Result<Option<i64>> {
            self.inner.max_version().await
        }
    }

    #[tokio::test]
    async fn test_reader_serves_from_cache_until_expiry() {
        let now = Utc.with_ymd_and_hms(2024, 1, 5, 9, 30, 0).unwrap();
        let clock = Arc::new(ManualClock::new(now));
        let store = Arc::new(CountingStore {
            inner: InMemoryRecordStore::new(),
            reads: AtomicUsize::new(0),
        });
        let record = CanonicalRecord::new(
            RecordPayload::Fundamentals(Fundamentals {
                ticker: "IBM".to_string(),
                name: Some("International Business Machines".to_string()),
                ..Fundamentals::default()
            }),
            "ALPHA_VANTAGE",
            now,
            10,
        );
        store.upsert(&record).await.unwrap();

        let cache = Arc::new(CacheLayer::new(clock.clone()));
        let reader = CachedRecordReader::new(store.clone(), cache, TtlPolicy::default());

        let first = reader
            .record(EntityType::Fundamentals, "IBM")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.entity_version, 10);
        assert_eq!(first.payload["entityKey"], "IBM");

        clock.advance(chrono::Duration::hours(1));
        reader
            .record(EntityType::Fundamentals, "IBM")
            .await
            .unwrap();
        assert_eq!(store.reads.load(Ordering::SeqCst), 1);

        clock.advance(chrono::Duration::hours(24));
        reader
            .record(EntityType::Fundamentals, "IBM")
            .await
            .unwrap();
        assert_eq!(store.reads.load(Ordering::SeqCst), 2);

        let feed = reader
            .ticker_feed(EntityType::Fundamentals, "IBM")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(feed.payload.as_array().map(Vec::len), Some(1));
    }
}

//! In-memory record store for tests and ephemeral runs.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::warn;

use super::{HistoryRange, Pruned, RecordStore, UpsertOutcome};
use crate::errors::Result;
use crate::records::{CanonicalRecord, EntityType};

type Key = (EntityType, String);

#[derive(Default)]
struct Tables {
    current: BTreeMap<Key, CanonicalRecord>,
    history: HashMap<Key, Vec<CanonicalRecord>>,
}

#[derive(Default)]
pub struct InMemoryRecordStore {
    tables: Mutex<Tables>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| {
            warn!("In-memory store mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn len(&self) -> usize {
        self.lock().current.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn all(&self) -> Vec<CanonicalRecord> {
        self.lock().current.values().cloned().collect()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn upsert(&self, record: &CanonicalRecord) -> Result<UpsertOutcome> {
        let key = (record.entity_type, record.entity_key.clone());
        let mut tables = self.lock();

        let outcome = match tables.current.get(&key) {
            Some(current) if record.version <= current.version => UpsertOutcome::Stale {
                current_version: current.version,
            },
            Some(current) if current.same_content(record) => UpsertOutcome::Refreshed {
                version: record.version,
            },
            Some(_) => UpsertOutcome::Updated {
                version: record.version,
            },
            None => UpsertOutcome::Inserted {
                version: record.version,
            },
        };

        match outcome {
            UpsertOutcome::Inserted { .. } | UpsertOutcome::Updated { .. } => {
                tables
                    .history
                    .entry(key.clone())
                    .or_default()
                    .push(record.clone());
                tables.current.insert(key, record.clone());
            }
            UpsertOutcome::Refreshed { .. } => {
                if let Some(current) = tables.current.get_mut(&key) {
                    current.version = record.version;
                    current.collected_at = record.collected_at;
                }
            }
            UpsertOutcome::Stale { .. } => {}
        }

        Ok(outcome)
    }

    async fn get(
        &self,
        entity_type: EntityType,
        entity_key: &str,
    ) -> Result<Option<CanonicalRecord>> {
        Ok(self
            .lock()
            .current
            .get(&(entity_type, entity_key.to_string()))
            .cloned())
    }

    async fn get_history(
        &self,
        entity_type: EntityType,
        entity_key: &str,
        range: &HistoryRange,
    ) -> Result<Vec<CanonicalRecord>> {
        let tables = self.lock();
        let mut rows: Vec<CanonicalRecord> = tables
            .history
            .get(&(entity_type, entity_key.to_string()))
            .map(|rows| {
                rows.iter()
                    .filter(|r| range.contains(r.collected_at))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        rows.sort_by(|a, b| b.version.cmp(&a.version));
        if let Some(limit) = range.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn list_by_ticker(
        &self,
        entity_type: EntityType,
        ticker: &str,
        limit: usize,
    ) -> Result<Vec<CanonicalRecord>> {
        Ok(self
            .lock()
            .current
            .values()
            .rev()
            .filter(|r| r.entity_type == entity_type && r.ticker.as_deref() == Some(ticker))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn prune(&self, entity_type: EntityType, older_than: DateTime<Utc>) -> Result<Pruned> {
        let mut tables = self.lock();
        let before = tables.current.len();
        tables
            .current
            .retain(|(t, _), r| *t != entity_type || r.collected_at >= older_than);
        let records = before - tables.current.len();

        let mut history = 0;
        tables.history.retain(|(t, _), rows| {
            if *t == entity_type {
                let before = rows.len();
                rows.retain(|r| r.collected_at >= older_than);
                history += before - rows.len();
            }
            !rows.is_empty()
        });
        Ok(Pruned { records, history })
    }

    async fn max_version(&self) -> Result<Option<i64>> {
        let tables = self.lock();
        Ok(tables
            .current
            .values()
            .chain(tables.history.values().flatten())
            .map(|r| r.version)
            .max())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{RecordPayload, StockPrice};
    use chrono::{Duration, NaiveDate, TimeZone, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn price_record(day: u32, close: Decimal, version: i64) -> CanonicalRecord {
        let at = Utc.with_ymd_and_hms(2024, 1, 5, 21, 0, 0).unwrap() + Duration::seconds(version);
        CanonicalRecord::new(
            RecordPayload::StockPrice(StockPrice {
                ticker: "AAPL".to_string(),
                date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
                open: None,
                high: None,
                low: None,
                close,
                adj_close: None,
                volume: None,
                currency: Some("USD".to_string()),
            }),
            "YAHOO",
            at,
            version,
        )
    }

    #[tokio::test]
    async fn test_insert_then_update() {
        let store = InMemoryRecordStore::new();
        let first = store.upsert(&price_record(5, dec!(181.18), 1)).await.unwrap();
        assert_eq!(first, UpsertOutcome::Inserted { version: 1 });

        let second = store.upsert(&price_record(5, dec!(182.00), 2)).await.unwrap();
        assert_eq!(second, UpsertOutcome::Updated { version: 2 });

        let stored = store
            .get(EntityType::StockPrice, "AAPL:2024-01-05")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.version, 2);
    }

    #[tokio::test]
    async fn test_lower_or_equal_version_is_discarded() {
        let store = InMemoryRecordStore::new();
        store.upsert(&price_record(5, dec!(181.18), 6)).await.unwrap();

        let stale = store.upsert(&price_record(5, dec!(170.00), 5)).await.unwrap();
        assert_eq!(stale, UpsertOutcome::Stale { current_version: 6 });
        let same = store.upsert(&price_record(5, dec!(170.00), 6)).await.unwrap();
        assert!(!same.is_applied());

        let stored = store
            .get(EntityType::StockPrice, "AAPL:2024-01-05")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.version, 6);
        if let RecordPayload::StockPrice(p) = stored.payload {
            assert_eq!(p.close, dec!(181.18));
        } else {
            panic!("wrong payload");
        }
    }

    #[tokio::test]
    async fn test_unchanged_content_only_refreshes() {
        let store = InMemoryRecordStore::new();
        let original = price_record(5, dec!(181.18), 1);
        store.upsert(&original).await.unwrap();
        let rerun = price_record(5, dec!(181.18), 2);
        let outcome = store.upsert(&rerun).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Refreshed { version: 2 });

        let stored = store
            .get(EntityType::StockPrice, "AAPL:2024-01-05")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.payload, original.payload);
        assert_eq!(stored.version, 2);
        assert_eq!(stored.collected_at, rerun.collected_at);

        let history = store
            .get_history(EntityType::StockPrice, "AAPL:2024-01-05", &HistoryRange::all())
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_history_is_newest_first_and_limited() {
        let store = InMemoryRecordStore::new();
        for (v, close) in [(1, dec!(1)), (2, dec!(2)), (3, dec!(3))] {
            store.upsert(&price_record(5, close, v)).await.unwrap();
        }
        let history = store
            .get_history(EntityType::StockPrice, "AAPL:2024-01-05", &HistoryRange::latest(2))
            .await
            .unwrap();
        assert_eq!(
            history.iter().map(|r| r.version).collect::<Vec<_>>(),
            vec![3, 2]
        );
    }

    #[tokio::test]
    async fn test_prune_drops_old_rows_of_one_type() {
        let store = InMemoryRecordStore::new();
        // Collected at 21:00:01, :02 and :03 on 2024-01-05.
        store.upsert(&price_record(3, dec!(1), 1)).await.unwrap();
        store.upsert(&price_record(4, dec!(1), 2)).await.unwrap();
        store.upsert(&price_record(4, dec!(2), 3)).await.unwrap();
        let fundamentals = CanonicalRecord::new(
            RecordPayload::Fundamentals(crate::records::Fundamentals {
                ticker: "AAPL".to_string(),
                ..Default::default()
            }),
            "ALPHA_VANTAGE",
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            4,
        );
        store.upsert(&fundamentals).await.unwrap();

        let cutoff = Utc.with_ymd_and_hms(2024, 1, 5, 21, 0, 3).unwrap();
        let pruned = store.prune(EntityType::StockPrice, cutoff).await.unwrap();
        assert_eq!(pruned, Pruned { records: 1, history: 2 });

        assert!(store
            .get(EntityType::StockPrice, "AAPL:2024-01-03")
            .await
            .unwrap()
            .is_none());
        let history = store
            .get_history(EntityType::StockPrice, "AAPL:2024-01-04", &HistoryRange::all())
            .await
            .unwrap();
        assert_eq!(history.iter().map(|r| r.version).collect::<Vec<_>>(), vec![3]);
        // Other types keep their rows however old.
        assert!(store
            .get(EntityType::Fundamentals, "AAPL")
            .await
            .unwrap()
            .is_some());
        assert_eq!(store.max_version().await.unwrap(), Some(4));
    }

    #[tokio::test]
    async fn test_max_version_of_empty_store() {
        assert_eq!(InMemoryRecordStore::new().max_version().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_list_by_ticker_newest_key_first() {
        let store = InMemoryRecordStore::new();
        for day in [3, 4, 5] {
            store.upsert(&price_record(day, dec!(100), 1)).await.unwrap();
        }
        let rows = store
            .list_by_ticker(EntityType::StockPrice, "AAPL", 2)
            .await
            .unwrap();
        assert_eq!(
            rows.iter().map(|r| r.entity_key.as_str()).collect::<Vec<_>>(),
            vec!["AAPL:2024-01-05", "AAPL:2024-01-04"]
        );
        assert!(store
            .get(EntityType::Fundamentals, "AAPL")
            .await
            .unwrap()
            .is_none());
    }
}

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use diesel::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tempfile::tempdir;

use super::SqliteRecordStore;
use crate::db::{create_pool, get_connection, init, run_migrations, spawn_writer, DbPool};
use crate::schema::record_history::dsl as history_dsl;
use findash_core::records::{
    CanonicalRecord, EntityType, Fundamentals, RecordPayload, StockPrice,
};
use findash_core::store::{HistoryRange, Pruned, RecordStore, UpsertOutcome};

/// Returns the store, its pool and the temp dir that keeps the file alive.
fn create_test_store() -> (SqliteRecordStore, Arc<DbPool>, tempfile::TempDir) {
    let temp_dir = tempdir().expect("Failed to create temp directory");
    let db_path = temp_dir.path().join("test.db");
    let db_path_str = db_path.to_string_lossy().to_string();

    init(&db_path_str).expect("Failed to init database");
    let pool = create_pool(&db_path_str).expect("Failed to create pool");
    run_migrations(&pool).expect("Failed to run migrations");
    let writer = spawn_writer((*pool).clone());

    (SqliteRecordStore::new(Arc::clone(&pool), writer), pool, temp_dir)
}

fn at(version: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 5, 21, 0, 0).unwrap() + Duration::minutes(version)
}

fn price(ticker: &str, day: u32, close: Decimal, version: i64) -> CanonicalRecord {
    CanonicalRecord::new(
        RecordPayload::StockPrice(StockPrice {
            ticker: ticker.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            open: None,
            high: None,
            low: None,
            close,
            adj_close: None,
            volume: Some(dec!(1000)),
            currency: Some("USD".to_string()),
        }),
        "YAHOO",
        at(version),
        version,
    )
}

fn history_rows(pool: &DbPool) -> i64 {
    let mut conn = get_connection(pool).expect("Failed to get connection");
    history_dsl::record_history
        .count()
        .get_result(&mut conn)
        .expect("Failed to count history")
}

#[tokio::test]
async fn test_insert_update_and_read_back() {
    let (store, pool, _dir) = create_test_store();

    assert_eq!(
        store.upsert(&price("AAPL", 5, dec!(181.18), 1)).await.unwrap(),
        UpsertOutcome::Inserted { version: 1 }
    );
    assert_eq!(
        store.upsert(&price("AAPL", 5, dec!(182.5), 2)).await.unwrap(),
        UpsertOutcome::Updated { version: 2 }
    );

    let stored = store
        .get(EntityType::StockPrice, "AAPL:2024-01-05")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored, price("AAPL", 5, dec!(182.5), 2));
    assert_eq!(history_rows(&pool), 2);

    assert!(store
        .get(EntityType::StockPrice, "AAPL:2024-01-04")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_stale_and_equal_versions_are_dropped() {
    let (store, pool, _dir) = create_test_store();
    store.upsert(&price("AAPL", 5, dec!(181.18), 6)).await.unwrap();

    assert_eq!(
        store.upsert(&price("AAPL", 5, dec!(150), 5)).await.unwrap(),
        UpsertOutcome::Stale { current_version: 6 }
    );
    assert_eq!(
        store.upsert(&price("AAPL", 5, dec!(150), 6)).await.unwrap(),
        UpsertOutcome::Stale { current_version: 6 }
    );

    let stored = store
        .get(EntityType::StockPrice, "AAPL:2024-01-05")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.version, 6);
    assert_eq!(history_rows(&pool), 1);
}

#[tokio::test]
async fn test_unchanged_content_refreshes_without_history() {
    let (store, pool, _dir) = create_test_store();
    store.upsert(&price("AAPL", 5, dec!(181.18), 1)).await.unwrap();

    let rerun = price("AAPL", 5, dec!(181.18), 2);
    assert_eq!(
        store.upsert(&rerun).await.unwrap(),
        UpsertOutcome::Refreshed { version: 2 }
    );

    let stored = store
        .get(EntityType::StockPrice, "AAPL:2024-01-05")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.version, 2);
    assert_eq!(stored.collected_at, rerun.collected_at);
    assert_eq!(history_rows(&pool), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writers_leave_highest_version() {
    let (store, _pool, _dir) = create_test_store();
    let store = Arc::new(store);

    let tasks: Vec<_> = (1..=20)
        .rev()
        .map(|v| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .upsert(&price("AAPL", 5, Decimal::from(v), v))
                    .await
                    .unwrap()
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    let stored = store
        .get(EntityType::StockPrice, "AAPL:2024-01-05")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.version, 20);
    assert_eq!(stored, price("AAPL", 5, Decimal::from(20), 20));
}

#[tokio::test]
async fn test_history_range_and_limit() {
    let (store, _pool, _dir) = create_test_store();
    for v in 1..=4 {
        store
            .upsert(&price("AAPL", 5, Decimal::from(100 + v), v))
            .await
            .unwrap();
    }

    let newest = store
        .get_history(EntityType::StockPrice, "AAPL:2024-01-05", &HistoryRange::latest(2))
        .await
        .unwrap();
    assert_eq!(newest.iter().map(|r| r.version).collect::<Vec<_>>(), vec![4, 3]);

    let window = HistoryRange {
        from: Some(at(2)),
        to: Some(at(3)),
        limit: None,
    };
    let middle = store
        .get_history(EntityType::StockPrice, "AAPL:2024-01-05", &window)
        .await
        .unwrap();
    assert_eq!(middle.iter().map(|r| r.version).collect::<Vec<_>>(), vec![3, 2]);
}

#[tokio::test]
async fn test_list_by_ticker_is_scoped_and_ordered() {
    let (store, _pool, _dir) = create_test_store();
    for day in [3, 4, 5] {
        store.upsert(&price("AAPL", day, dec!(100), 1)).await.unwrap();
    }
    store.upsert(&price("MSFT", 5, dec!(367.75), 1)).await.unwrap();
    store
        .upsert(&CanonicalRecord::new(
            RecordPayload::Fundamentals(Fundamentals {
                ticker: "AAPL".to_string(),
                ..Fundamentals::default()
            }),
            "ALPHA_VANTAGE",
            at(1),
            1,
        ))
        .await
        .unwrap();

    let rows = store
        .list_by_ticker(EntityType::StockPrice, "AAPL", 2)
        .await
        .unwrap();
    assert_eq!(
        rows.iter().map(|r| r.entity_key.as_str()).collect::<Vec<_>>(),
        vec!["AAPL:2024-01-05", "AAPL:2024-01-04"]
    );
}

#[tokio::test]
async fn test_reopen_keeps_records() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("nested").join("findash.db");
    let path = path.to_string_lossy().to_string();

    {
        let store = SqliteRecordStore::open(&path).unwrap();
        store.upsert(&price("AAPL", 5, dec!(181.18), 1)).await.unwrap();
    }

    let store = SqliteRecordStore::open(&path).unwrap();
    let stored = store
        .get(EntityType::StockPrice, "AAPL:2024-01-05")
        .await
        .unwrap();
    assert!(stored.is_some());
    assert_eq!(store.max_version().await.unwrap(), Some(1));
}

#[tokio::test]
async fn test_prune_removes_old_rows_of_one_type() {
    let (store, pool, _dir) = create_test_store();
    assert_eq!(store.max_version().await.unwrap(), None);

    // Collected at 21:01, 21:02 and 21:03.
    store.upsert(&price("AAPL", 3, dec!(1), 1)).await.unwrap();
    store.upsert(&price("AAPL", 4, dec!(1), 2)).await.unwrap();
    store.upsert(&price("AAPL", 4, dec!(2), 3)).await.unwrap();
    let fundamentals = CanonicalRecord::new(
        RecordPayload::Fundamentals(Fundamentals {
            ticker: "AAPL".to_string(),
            ..Default::default()
        }),
        "ALPHA_VANTAGE",
        at(0),
        4,
    );
    store.upsert(&fundamentals).await.unwrap();
    assert_eq!(history_rows(&pool), 4);

    let pruned = store.prune(EntityType::StockPrice, at(3)).await.unwrap();
    assert_eq!(pruned, Pruned { records: 1, history: 2 });
    assert_eq!(history_rows(&pool), 2);

    assert!(store
        .get(EntityType::StockPrice, "AAPL:2024-01-03")
        .await
        .unwrap()
        .is_none());
    assert!(store
        .get(EntityType::StockPrice, "AAPL:2024-01-04")
        .await
        .unwrap()
        .is_some());
    assert!(store
        .get(EntityType::Fundamentals, "AAPL")
        .await
        .unwrap()
        .is_some());
    assert_eq!(store.max_version().await.unwrap(), Some(4));

    let again = store.prune(EntityType::StockPrice, at(3)).await.unwrap();
    assert_eq!(again, Pruned::default());
}

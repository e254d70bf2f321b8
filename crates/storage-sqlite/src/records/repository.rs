use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::dsl::max;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use log::debug;

use super::model::{encode_timestamp, RecordDB, RecordHistoryDB};
use crate::db::{
    create_pool, get_connection, init, run_migrations, spawn_writer, DbPool, WriteHandle,
};
use crate::errors::{IntoCore, StorageError};
use crate::schema::canonical_records::dsl as records_dsl;
use crate::schema::record_history::dsl as history_dsl;
use findash_core::records::{CanonicalRecord, EntityType};
use findash_core::store::{HistoryRange, Pruned, RecordStore, UpsertOutcome};
use findash_core::Result;

pub struct SqliteRecordStore {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl SqliteRecordStore {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }

    /// Opens (or creates) the database at `db_path`, applies pending
    /// migrations and starts the writer. Must be called inside a tokio runtime.
    pub fn open(db_path: &str) -> Result<Self> {
        init(db_path)?;
        let pool = create_pool(db_path)?;
        run_migrations(&pool)?;
        let writer = spawn_writer(pool.as_ref().clone());
        Ok(Self::new(pool, writer))
    }
}

// =============================================================================
// Conditional write
// =============================================================================

/// Compares the offered record against the stored one and applies it. Runs on
/// the writer connection inside an immediate transaction.
fn conditional_upsert(
    conn: &mut SqliteConnection,
    record: &CanonicalRecord,
) -> Result<UpsertOutcome> {
    let row = RecordDB::try_from(record)?;
    let target = records_dsl::canonical_records
        .find((row.entity_type.clone(), row.entity_key.clone()));

    let current: Option<RecordDB> = records_dsl::canonical_records
        .find((row.entity_type.as_str(), row.entity_key.as_str()))
        .select(RecordDB::as_select())
        .first(conn)
        .optional()
        .into_core()?;

    let outcome = match current {
        Some(current) if record.version <= current.version => UpsertOutcome::Stale {
            current_version: current.version,
        },
        Some(current) => {
            let stored = CanonicalRecord::try_from(current)?;
            if stored.same_content(record) {
                UpsertOutcome::Refreshed {
                    version: record.version,
                }
            } else {
                UpsertOutcome::Updated {
                    version: record.version,
                }
            }
        }
        None => UpsertOutcome::Inserted {
            version: record.version,
        },
    };

    match outcome {
        UpsertOutcome::Inserted { .. } => {
            diesel::insert_into(records_dsl::canonical_records)
                .values(&row)
                .execute(conn)
                .into_core()?;
            append_history(conn, row)?;
        }
        UpsertOutcome::Updated { .. } => {
            diesel::update(target)
                .set(&row)
                .execute(conn)
                .into_core()?;
            append_history(conn, row)?;
        }
        UpsertOutcome::Refreshed { .. } => {
            diesel::update(target)
                .set((
                    records_dsl::version.eq(row.version),
                    records_dsl::collected_at.eq(&row.collected_at),
                ))
                .execute(conn)
                .into_core()?;
        }
        UpsertOutcome::Stale { current_version } => {
            debug!(
                "Dropped stale {}/{} v{} (stored v{})",
                row.entity_type, row.entity_key, row.version, current_version
            );
        }
    }
    Ok(outcome)
}

fn append_history(conn: &mut SqliteConnection, row: RecordDB) -> Result<()> {
    diesel::insert_into(history_dsl::record_history)
        .values(RecordHistoryDB::from(row))
        .execute(conn)
        .into_core()?;
    Ok(())
}

/// Both deletes share the writer's transaction.
fn prune_rows(
    conn: &mut SqliteConnection,
    entity_type: &str,
    cutoff: &str,
) -> Result<Pruned> {
    let records = diesel::delete(
        records_dsl::canonical_records
            .filter(records_dsl::entity_type.eq(entity_type))
            .filter(records_dsl::collected_at.lt(cutoff)),
    )
    .execute(conn)
    .into_core()?;
    let history = diesel::delete(
        history_dsl::record_history
            .filter(history_dsl::entity_type.eq(entity_type))
            .filter(history_dsl::collected_at.lt(cutoff)),
    )
    .execute(conn)
    .into_core()?;
    Ok(Pruned { records, history })
}

fn decode_all<R>(rows: Vec<R>) -> Result<Vec<CanonicalRecord>>
where
    CanonicalRecord: TryFrom<R, Error = StorageError>,
{
    rows.into_iter()
        .map(|row| CanonicalRecord::try_from(row).map_err(Into::into))
        .collect()
}

// =============================================================================
// RecordStore Implementation
// =============================================================================

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn upsert(&self, record: &CanonicalRecord) -> Result<UpsertOutcome> {
        let record = record.clone();
        self.writer
            .exec(move |conn| conditional_upsert(conn, &record))
            .await
    }

    async fn get(
        &self,
        entity_type: EntityType,
        entity_key: &str,
    ) -> Result<Option<CanonicalRecord>> {
        let mut conn = get_connection(&self.pool)?;
        let row = records_dsl::canonical_records
            .find((entity_type.as_str(), entity_key))
            .select(RecordDB::as_select())
            .first(&mut conn)
            .optional()
            .into_core()?;
        row.map(|r| CanonicalRecord::try_from(r).map_err(Into::into))
            .transpose()
    }

    async fn get_history(
        &self,
        entity_type: EntityType,
        entity_key: &str,
        range: &HistoryRange,
    ) -> Result<Vec<CanonicalRecord>> {
        let mut conn = get_connection(&self.pool)?;
        let mut query = history_dsl::record_history
            .filter(history_dsl::entity_type.eq(entity_type.as_str()))
            .filter(history_dsl::entity_key.eq(entity_key))
            .order(history_dsl::version.desc())
            .select(RecordHistoryDB::as_select())
            .into_boxed();

        if let Some(from) = range.from {
            query = query.filter(history_dsl::collected_at.ge(encode_timestamp(from)));
        }
        if let Some(to) = range.to {
            query = query.filter(history_dsl::collected_at.le(encode_timestamp(to)));
        }
        if let Some(limit) = range.limit {
            query = query.limit(i64::try_from(limit).unwrap_or(i64::MAX));
        }

        let rows = query.load::<RecordHistoryDB>(&mut conn).into_core()?;
        decode_all(rows)
    }

    async fn list_by_ticker(
        &self,
        entity_type: EntityType,
        ticker: &str,
        limit: usize,
    ) -> Result<Vec<CanonicalRecord>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = records_dsl::canonical_records
            .filter(records_dsl::entity_type.eq(entity_type.as_str()))
            .filter(records_dsl::ticker.eq(ticker))
            .order(records_dsl::entity_key.desc())
            .limit(i64::try_from(limit).unwrap_or(i64::MAX))
            .select(RecordDB::as_select())
            .load::<RecordDB>(&mut conn)
            .into_core()?;
        decode_all(rows)
    }

    async fn prune(&self, entity_type: EntityType, older_than: DateTime<Utc>) -> Result<Pruned> {
        let cutoff = encode_timestamp(older_than);
        let pruned = self
            .writer
            .exec(move |conn| prune_rows(conn, entity_type.as_str(), &cutoff))
            .await?;
        debug!(
            "Pruned {} {} record(s) and {} history row(s) collected before {}",
            pruned.records, entity_type, pruned.history, older_than
        );
        Ok(pruned)
    }

    async fn max_version(&self) -> Result<Option<i64>> {
        let mut conn = get_connection(&self.pool)?;
        let current: Option<i64> = records_dsl::canonical_records
            .select(max(records_dsl::version))
            .get_result(&mut conn)
            .into_core()?;
        let history: Option<i64> = history_dsl::record_history
            .select(max(history_dsl::version))
            .get_result(&mut conn)
            .into_core()?;
        Ok(current.max(history))
    }
}

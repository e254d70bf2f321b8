//! Database models for canonical records and their history.

use chrono::{DateTime, SecondsFormat, Utc};
use diesel::prelude::*;

use crate::errors::StorageError;
use findash_core::records::{CanonicalRecord, EntityType, RecordPayload};

/// Timestamps are stored as fixed-width RFC 3339 so text order is time order.
pub(crate) fn encode_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_timestamp(raw: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| StorageError::CorruptRow(format!("bad timestamp '{}': {}", raw, e)))
}

/// Current row per `(entity_type, entity_key)`.
#[derive(Queryable, Identifiable, Selectable, Insertable, AsChangeset, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::canonical_records)]
#[diesel(primary_key(entity_type, entity_key))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(treat_none_as_null = true)]
pub struct RecordDB {
    pub entity_type: String,
    pub entity_key: String,
    pub ticker: Option<String>,
    pub payload: String,
    pub source: String,
    pub collected_at: String,
    pub version: i64,
}

/// One applied content change.
#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::record_history)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct RecordHistoryDB {
    pub entity_type: String,
    pub entity_key: String,
    pub ticker: Option<String>,
    pub payload: String,
    pub source: String,
    pub collected_at: String,
    pub version: i64,
}

impl TryFrom<&CanonicalRecord> for RecordDB {
    type Error = StorageError;

    fn try_from(record: &CanonicalRecord) -> Result<Self, Self::Error> {
        let payload = serde_json::to_string(&record.payload)
            .map_err(|e| StorageError::CorruptRow(format!("cannot encode payload: {}", e)))?;
        Ok(Self {
            entity_type: record.entity_type.as_str().to_string(),
            entity_key: record.entity_key.clone(),
            ticker: record.ticker.clone(),
            payload,
            source: record.source.clone(),
            collected_at: encode_timestamp(record.collected_at),
            version: record.version,
        })
    }
}

impl From<RecordDB> for RecordHistoryDB {
    fn from(row: RecordDB) -> Self {
        Self {
            entity_type: row.entity_type,
            entity_key: row.entity_key,
            ticker: row.ticker,
            payload: row.payload,
            source: row.source,
            collected_at: row.collected_at,
            version: row.version,
        }
    }
}

fn decode(
    entity_type: &str,
    entity_key: String,
    ticker: Option<String>,
    payload: &str,
    source: String,
    collected_at: &str,
    version: i64,
) -> Result<CanonicalRecord, StorageError> {
    let entity_type: EntityType = entity_type
        .parse()
        .map_err(|_| StorageError::CorruptRow(format!("unknown entity type '{}'", entity_type)))?;
    let payload: RecordPayload = serde_json::from_str(payload).map_err(|e| {
        StorageError::CorruptRow(format!("payload of {}/{}: {}", entity_type, entity_key, e))
    })?;
    if payload.entity_type() != entity_type {
        return Err(StorageError::CorruptRow(format!(
            "{}/{} holds a {} payload",
            entity_type,
            entity_key,
            payload.entity_type()
        )));
    }
    Ok(CanonicalRecord {
        entity_type,
        entity_key,
        ticker,
        payload,
        source,
        collected_at: decode_timestamp(collected_at)?,
        version,
    })
}

impl TryFrom<RecordDB> for CanonicalRecord {
    type Error = StorageError;

    fn try_from(row: RecordDB) -> Result<Self, Self::Error> {
        decode(
            &row.entity_type,
            row.entity_key,
            row.ticker,
            &row.payload,
            row.source,
            &row.collected_at,
            row.version,
        )
    }
}

impl TryFrom<RecordHistoryDB> for CanonicalRecord {
    type Error = StorageError;

    fn try_from(row: RecordHistoryDB) -> Result<Self, Self::Error> {
        decode(
            &row.entity_type,
            row.entity_key,
            row.ticker,
            &row.payload,
            row.source,
            &row.collected_at,
            row.version,
        )
    }
}

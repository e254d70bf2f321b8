use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::Result;
use crate::records::{CanonicalRecord, EntityType};

/// What an upsert did with the offered record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// First record for this entity.
    Inserted { version: i64 },
    /// Domain content changed; a history row was appended.
    Updated { version: i64 },
    /// Content unchanged; only `collected_at` and `version` moved forward.
    Refreshed { version: i64 },
    /// The offered version is not newer than the stored one and was dropped.
    Stale { current_version: i64 },
}

impl UpsertOutcome {
    /// Version held by the store after the call.
    pub fn version(&self) -> i64 {
        match *self {
            UpsertOutcome::Inserted { version }
            | UpsertOutcome::Updated { version }
            | UpsertOutcome::Refreshed { version } => version,
            UpsertOutcome::Stale { current_version } => current_version,
        }
    }

    /// True when the stored record changed and derived cache entries are now stale.
    pub fn is_applied(&self) -> bool {
        !matches!(self, UpsertOutcome::Stale { .. })
    }
}

/// Rows a retention sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pruned {
    pub records: usize,
    pub history: usize,
}

/// Window over a record's stored history, by `collected_at`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl HistoryRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn latest(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from.map_or(true, |from| at >= from) && self.to.map_or(true, |to| at <= to)
    }
}

/// Durable home of canonical records.
///
/// Implementations must make `upsert` atomic per `(entity_type, entity_key)`:
/// the version comparison and the write happen as one step, so concurrent
/// writers can never leave a lower version in place of a higher one.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn upsert(&self, record: &CanonicalRecord) -> Result<UpsertOutcome>;

    async fn get(&self, entity_type: EntityType, entity_key: &str)
        -> Result<Option<CanonicalRecord>>;

    /// Previous versions whose content differed, newest first.
    async fn get_history(
        &self,
        entity_type: EntityType,
        entity_key: &str,
        range: &HistoryRange,
    ) -> Result<Vec<CanonicalRecord>>;

    /// Current records of one type for a ticker, ordered by entity key descending.
    async fn list_by_ticker(
        &self,
        entity_type: EntityType,
        ticker: &str,
        limit: usize,
    ) -> Result<Vec<CanonicalRecord>>;

    /// Deletes records of `entity_type` last collected before `older_than`,
    /// and history rows of that type collected before it.
    async fn prune(&self, entity_type: EntityType, older_than: DateTime<Utc>) -> Result<Pruned>;

    /// Highest version held, current or historical. `None` when empty.
    async fn max_version(&self) -> Result<Option<i64>>;
}

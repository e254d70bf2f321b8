//! Whether an entity can be served, and if not, why.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::collectors::owner_of;
use crate::errors::Result;
use crate::records::{CanonicalRecord, EntityType};
use crate::scheduler::JobRegistry;
use crate::store::RecordStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum Availability {
    /// Stored data exists. `collection_failing` flags that the owning job's
    /// latest run failed, so the record may be getting old.
    Available {
        record: Box<CanonicalRecord>,
        collection_failing: bool,
    },
    /// Nothing stored and the owning job has not failed.
    NeverCollected,
    /// Nothing stored and the owning job's latest run failed.
    CollectionFailing {
        collector_id: String,
        consecutive_failures: u32,
        last_error: Option<String>,
        next_run_at: DateTime<Utc>,
    },
}

pub async fn availability(
    store: &dyn RecordStore,
    jobs: &JobRegistry,
    entity_type: EntityType,
    entity_key: &str,
) -> Result<Availability> {
    let collector_id = owner_of(entity_type);
    let job = jobs.snapshot(collector_id);
    let failing = job.as_ref().map_or(false, |j| j.is_failing());

    if let Some(record) = store.get(entity_type, entity_key).await? {
        return Ok(Availability::Available {
            record: Box::new(record),
            collection_failing: failing,
        });
    }

    Ok(match job {
        Some(job) if failing => Availability::CollectionFailing {
            collector_id: job.collector_id,
            consecutive_failures: job.consecutive_failures,
            last_error: job.last_error,
            next_run_at: job.next_run_at,
        },
        _ => Availability::NeverCollected,
    })
}

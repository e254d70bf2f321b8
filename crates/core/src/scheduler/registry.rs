use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use log::warn;

use super::job::{CollectionJob, JobSnapshot};
use crate::errors::{Error, Result};

/// Jobs keyed by collector id. Owned by the scheduler and shared read-only
/// with status queries.
#[derive(Default)]
pub struct JobRegistry {
    jobs: Mutex<BTreeMap<String, CollectionJob>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, BTreeMap<String, CollectionJob>> {
        self.jobs.lock().unwrap_or_else(|poisoned| {
            warn!("Job registry mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub(crate) fn insert(&self, job: CollectionJob) -> Result<()> {
        let mut jobs = self.lock();
        let id = job.id().to_string();
        if jobs.contains_key(&id) {
            return Err(Error::Config(format!(
                "collector '{}' is already scheduled",
                id
            )));
        }
        jobs.insert(id, job);
        Ok(())
    }

    pub fn contains(&self, collector_id: &str) -> bool {
        self.lock().contains_key(collector_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn snapshot(&self, collector_id: &str) -> Option<JobSnapshot> {
        self.lock().get(collector_id).map(CollectionJob::snapshot)
    }

    /// All jobs ordered by collector id.
    pub fn snapshots(&self) -> Vec<JobSnapshot> {
        self.lock().values().map(CollectionJob::snapshot).collect()
    }
}

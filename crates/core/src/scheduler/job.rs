use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ScheduleSpec;
use crate::collectors::{Collector, RunVerdict};
use crate::targets::TargetResolver;

/// Where a job is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Idle,
    Running,
    /// Last run failed; a backoff retry is pending at `next_run_at`.
    Retrying,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LastStatus {
    Never,
    Success,
    Failed,
}

/// Exponential backoff for failed runs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    #[serde(with = "secs")]
    pub base: Duration,
    #[serde(with = "secs")]
    pub max_delay: Duration,
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(30),
            max_delay: Duration::from_secs(30 * 60),
            max_retries: 5,
        }
    }
}

impl RetryPolicy {
    /// Delay after `consecutive_failures` failed runs in a row:
    /// `base * 2^consecutive_failures`, capped at `max_delay`. The first
    /// retry therefore waits twice `base`.
    pub fn delay_for(&self, consecutive_failures: u32) -> Duration {
        let exp = consecutive_failures.min(31);
        self.base
            .checked_mul(1u32 << exp)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

/// Summary of the most recent finished run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub verdict: RunVerdict,
}

/// A registered collector with its schedule and run bookkeeping.
pub struct CollectionJob {
    pub(crate) collector: Arc<dyn Collector>,
    pub(crate) targets: Arc<dyn TargetResolver>,
    pub(crate) schedule: ScheduleSpec,
    pub(crate) state: JobState,
    pub(crate) last_status: LastStatus,
    pub(crate) next_run_at: DateTime<Utc>,
    pub(crate) running_since: Option<DateTime<Utc>>,
    pub(crate) consecutive_failures: u32,
    /// Backoff retries spent since the last success or exhaustion.
    pub(crate) retry_attempts: u32,
    pub(crate) exhausted: bool,
    pub(crate) last_error: Option<String>,
    pub(crate) last_run: Option<RunSummary>,
    pub(crate) last_success_at: Option<DateTime<Utc>>,
}

impl CollectionJob {
    pub(crate) fn new(
        collector: Arc<dyn Collector>,
        schedule: ScheduleSpec,
        targets: Arc<dyn TargetResolver>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            collector,
            targets,
            schedule,
            state: JobState::Idle,
            last_status: LastStatus::Never,
            next_run_at: schedule.first_run(now),
            running_since: None,
            consecutive_failures: 0,
            retry_attempts: 0,
            exhausted: false,
            last_error: None,
            last_run: None,
            last_success_at: None,
        }
    }

    pub fn id(&self) -> &str {
        self.collector.id()
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_run_at <= now
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            collector_id: self.id().to_string(),
            schedule: self.schedule.to_string(),
            state: self.state,
            last_status: self.last_status,
            next_run_at: self.next_run_at,
            running_since: self.running_since,
            consecutive_failures: self.consecutive_failures,
            exhausted: self.exhausted,
            last_error: self.last_error.clone(),
            last_run: self.last_run.clone(),
            last_success_at: self.last_success_at,
        }
    }
}

/// Read-only view of a job for status endpoints and tests.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub collector_id: String,
    pub schedule: String,
    pub state: JobState,
    pub last_status: LastStatus,
    pub next_run_at: DateTime<Utc>,
    pub running_since: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub exhausted: bool,
    pub last_error: Option<String>,
    pub last_run: Option<RunSummary>,
    pub last_success_at: Option<DateTime<Utc>>,
}

impl JobSnapshot {
    /// The most recent run failed and no success has come since.
    pub fn is_failing(&self) -> bool {
        self.last_status == LastStatus::Failed
    }
}

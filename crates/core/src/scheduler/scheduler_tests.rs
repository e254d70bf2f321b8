//! Scheduler state machine, overlap handling and retry backoff.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::collectors::{
    CollectionReport, Collector, FailureKind, FailurePolicy, RunVerdict, TargetFailure,
    TargetOutcome, TargetStatus,
};
use crate::errors::Error;
use crate::targets::StaticTargets;
use crate::utils::{Clock, ManualClock};

// =========================================================================
// Scripted collector
// =========================================================================

struct ScriptedCollector {
    clock: Arc<ManualClock>,
    /// Per-run statuses; when empty every target succeeds.
    script: Mutex<VecDeque<Vec<TargetStatus>>>,
    gate: Option<Arc<Semaphore>>,
    calls: AtomicUsize,
}

impl ScriptedCollector {
    fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            script: Mutex::new(VecDeque::new()),
            gate: None,
            calls: AtomicUsize::new(0),
        }
    }

    fn gated(clock: Arc<ManualClock>, gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new(clock)
        }
    }

    fn then(self, statuses: Vec<TargetStatus>) -> Self {
        self.script.lock().unwrap().push_back(statuses);
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Collector for ScriptedCollector {
    fn id(&self) -> &str {
        "scripted"
    }

    async fn collect(&self, targets: &[String], cancel: &CancellationToken) -> CollectionReport {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut report = CollectionReport::new("scripted", self.clock.now());

        if let Some(gate) = &self.gate {
            tokio::select! {
                _ = cancel.cancelled() => {
                    report.cancelled = true;
                    return report;
                }
                _ = gate.acquire() => {}
            }
        }

        let statuses = self.script.lock().unwrap().pop_front();
        report.outcomes = targets
            .iter()
            .enumerate()
            .map(|(i, t)| TargetOutcome {
                target: t.clone(),
                provider: Some("MOCK".to_string()),
                status: statuses
                    .as_ref()
                    .and_then(|s| s.get(i).cloned())
                    .unwrap_or(TargetStatus::Succeeded {
                        written: 1,
                        refreshed: 0,
                        stale: 0,
                    }),
            })
            .collect();
        report.finished_at = self.clock.now();
        report
    }
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 5, 12, 0, 0).unwrap()
}

fn ok() -> TargetStatus {
    TargetStatus::Succeeded {
        written: 1,
        refreshed: 0,
        stale: 0,
    }
}

fn failed(kind: FailureKind) -> TargetStatus {
    TargetStatus::Failed(TargetFailure::new(kind, "boom"))
}

fn targets(n: usize) -> Arc<StaticTargets> {
    Arc::new(StaticTargets::new((0..n).map(|i| format!("T{}", i))))
}

fn build_scheduler(clock: Arc<ManualClock>, retry: RetryPolicy) -> Scheduler {
    Scheduler::new(
        SchedulerSettings {
            workers: 2,
            retry,
            failure_policy: FailurePolicy::default(),
        },
        clock,
    )
}

fn retry(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        base: Duration::from_secs(60),
        max_delay: Duration::from_secs(3600),
        max_retries,
    }
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_due_job_runs_and_records_success() {
    let clock = Arc::new(ManualClock::new(t0()));
    let collector = Arc::new(ScriptedCollector::new(clock.clone()));
    let scheduler = build_scheduler(clock.clone(), retry(3));
    scheduler
        .register_spec(collector.clone(), "every 15m", targets(2))
        .unwrap();

    let tick = scheduler.run_due_jobs(t0());
    assert_eq!(tick.dispatched, vec!["scripted"]);
    assert_eq!(
        scheduler.registry().snapshot("scripted").unwrap().state,
        JobState::Running
    );

    let done = scheduler.await_completion().await.unwrap();
    assert_eq!(done.verdict, RunVerdict::Success { failed_count: 0 });

    let job = scheduler.registry().snapshot("scripted").unwrap();
    assert_eq!(job.state, JobState::Idle);
    assert_eq!(job.last_status, LastStatus::Success);
    assert_eq!(job.next_run_at, t0() + chrono::Duration::minutes(15));
    assert!(job.last_run.is_some());

    // Not due again until the next slot.
    assert!(scheduler
        .run_due_jobs(t0() + chrono::Duration::minutes(14))
        .dispatched
        .is_empty());
    assert_eq!(collector.calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_overlapping_run_is_skipped_not_queued() {
    let clock = Arc::new(ManualClock::new(t0()));
    let gate = Arc::new(Semaphore::new(0));
    let collector = Arc::new(ScriptedCollector::gated(clock.clone(), gate.clone()));
    let scheduler = build_scheduler(clock.clone(), retry(3));
    scheduler
        .register_spec(collector.clone(), "every 15m", targets(1))
        .unwrap();

    assert_eq!(scheduler.run_due_jobs(t0()).dispatched.len(), 1);

    let later = t0() + chrono::Duration::minutes(15);
    let tick = scheduler.run_due_jobs(later);
    assert!(tick.dispatched.is_empty());
    assert_eq!(tick.skipped_overlap, vec!["scripted"]);
    assert_eq!(
        scheduler.registry().snapshot("scripted").unwrap().next_run_at,
        later + chrono::Duration::minutes(15)
    );

    gate.add_permits(1);
    scheduler.await_completion().await.unwrap();
    assert_eq!(collector.calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_partial_failure_below_threshold_is_success() {
    let clock = Arc::new(ManualClock::new(t0()));
    let mut statuses = vec![ok(); 7];
    statuses.extend(vec![failed(FailureKind::Transient); 3]);
    let collector = Arc::new(ScriptedCollector::new(clock.clone()).then(statuses));
    let scheduler = build_scheduler(clock.clone(), retry(3));
    scheduler
        .register_spec(collector, "every 15m", targets(10))
        .unwrap();

    scheduler.run_due_jobs(t0());
    let done = scheduler.await_completion().await.unwrap();
    assert_eq!(done.verdict, RunVerdict::Success { failed_count: 3 });
    assert_eq!(
        scheduler.registry().snapshot("scripted").unwrap().last_status,
        LastStatus::Success
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_run_backs_off_exponentially() {
    let clock = Arc::new(ManualClock::new(t0()));
    let all_fail = vec![failed(FailureKind::Transient); 2];
    let collector = Arc::new(
        ScriptedCollector::new(clock.clone())
            .then(all_fail.clone())
            .then(all_fail),
    );
    let scheduler = build_scheduler(clock.clone(), retry(3));
    scheduler
        .register_spec(collector.clone(), "every 1h", targets(2))
        .unwrap();

    scheduler.run_due_jobs(t0());
    scheduler.await_completion().await.unwrap();
    let job = scheduler.registry().snapshot("scripted").unwrap();
    assert_eq!(job.state, JobState::Retrying);
    assert_eq!(job.last_status, LastStatus::Failed);
    assert_eq!(job.consecutive_failures, 1);
    assert_eq!(job.next_run_at, t0() + chrono::Duration::seconds(120));

    let retry_at = t0() + chrono::Duration::seconds(120);
    clock.set(retry_at);
    assert_eq!(scheduler.run_due_jobs(retry_at).dispatched.len(), 1);
    scheduler.await_completion().await.unwrap();
    let job = scheduler.registry().snapshot("scripted").unwrap();
    assert_eq!(job.consecutive_failures, 2);
    assert_eq!(job.next_run_at, retry_at + chrono::Duration::seconds(240));

    // Third run succeeds and clears the failure streak.
    let second_retry = retry_at + chrono::Duration::seconds(240);
    clock.set(second_retry);
    scheduler.run_due_jobs(second_retry);
    scheduler.await_completion().await.unwrap();
    let job = scheduler.registry().snapshot("scripted").unwrap();
    assert_eq!(job.state, JobState::Idle);
    assert_eq!(job.last_status, LastStatus::Success);
    assert_eq!(job.consecutive_failures, 0);
    assert_eq!(job.next_run_at, second_retry + chrono::Duration::hours(1));
    assert_eq!(collector.calls(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_exhausted_retries_return_to_cadence() {
    let clock = Arc::new(ManualClock::new(t0()));
    let all_fail = vec![failed(FailureKind::Transient)];
    let collector = Arc::new(
        ScriptedCollector::new(clock.clone())
            .then(all_fail.clone())
            .then(all_fail),
    );
    let scheduler = build_scheduler(clock.clone(), retry(1));
    scheduler
        .register_spec(collector, "every 1h", targets(1))
        .unwrap();

    scheduler.run_due_jobs(t0());
    scheduler.await_completion().await.unwrap();

    let retry_at = t0() + chrono::Duration::seconds(120);
    clock.set(retry_at);
    scheduler.run_due_jobs(retry_at);
    scheduler.await_completion().await.unwrap();

    let job = scheduler.registry().snapshot("scripted").unwrap();
    assert!(job.exhausted);
    assert_eq!(job.state, JobState::Idle);
    assert_eq!(job.last_status, LastStatus::Failed);
    assert_eq!(job.consecutive_failures, 2);
    assert_eq!(job.next_run_at, retry_at + chrono::Duration::hours(1));
    assert_eq!(job.last_error.as_deref(), Some("T0: boom"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_quota_failures_skip_backoff() {
    let clock = Arc::new(ManualClock::new(t0()));
    let collector = Arc::new(
        ScriptedCollector::new(clock.clone()).then(vec![failed(FailureKind::RateLimited); 3]),
    );
    let scheduler = build_scheduler(clock.clone(), retry(3));
    scheduler
        .register_spec(collector, "every 15m", targets(3))
        .unwrap();

    scheduler.run_due_jobs(t0());
    let done = scheduler.await_completion().await.unwrap();
    assert!(matches!(
        done.verdict,
        RunVerdict::Failed {
            retryable: false,
            ..
        }
    ));

    let job = scheduler.registry().snapshot("scripted").unwrap();
    assert_eq!(job.state, JobState::Idle);
    assert_eq!(job.last_status, LastStatus::Failed);
    assert!(!job.exhausted);
    assert_eq!(job.next_run_at, t0() + chrono::Duration::minutes(15));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_registration_errors() {
    let clock = Arc::new(ManualClock::new(t0()));
    let scheduler = build_scheduler(clock.clone(), retry(3));
    let collector = Arc::new(ScriptedCollector::new(clock.clone()));

    assert!(matches!(
        scheduler.register_spec(collector.clone(), "every blue moon", targets(1)),
        Err(Error::Config(_))
    ));
    scheduler
        .register_spec(collector.clone(), "daily@06:00", targets(1))
        .unwrap();
    assert!(matches!(
        scheduler.register_spec(collector, "every 1h", targets(1)),
        Err(Error::Config(_))
    ));
    assert_eq!(scheduler.registry().len(), 1);
    assert_eq!(
        scheduler.registry().snapshot("scripted").unwrap().next_run_at,
        Utc.with_ymd_and_hms(2024, 1, 6, 6, 0, 0).unwrap()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_cancels_in_flight_run() {
    let clock = Arc::new(ManualClock::new(t0()));
    let gate = Arc::new(Semaphore::new(0));
    let collector = Arc::new(ScriptedCollector::gated(clock.clone(), gate));
    let scheduler = build_scheduler(clock.clone(), retry(3));
    scheduler
        .register_spec(collector.clone(), "every 15m", targets(1))
        .unwrap();

    scheduler.run_due_jobs(t0());
    // Let a worker pick the run up before cancelling.
    while collector.calls() == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    scheduler.shutdown(Duration::from_secs(5)).await;

    let job = scheduler.registry().snapshot("scripted").unwrap();
    assert_eq!(job.state, JobState::Idle);
    assert_eq!(job.last_status, LastStatus::Never);
    assert_eq!(
        job.last_run.map(|r| r.verdict),
        Some(RunVerdict::Cancelled)
    );

    // Nothing is dispatched after shutdown.
    assert!(scheduler
        .run_due_jobs(t0() + chrono::Duration::hours(1))
        .dispatched
        .is_empty());
}

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::job::{CollectionJob, JobSnapshot, JobState, LastStatus, RetryPolicy, RunSummary};
use super::registry::JobRegistry;
use super::worker_pool::{Dispatch, RunCompletion, WorkerPool};
use super::ScheduleSpec;
use crate::collectors::{Collector, FailurePolicy, RunVerdict};
use crate::errors::Result;
use crate::targets::TargetResolver;
use crate::utils::Clock;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerSettings {
    pub workers: usize,
    pub retry: RetryPolicy,
    pub failure_policy: FailurePolicy,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            workers: 4,
            retry: RetryPolicy::default(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub dispatched: Vec<String>,
    /// Due jobs whose previous run was still in flight.
    pub skipped_overlap: Vec<String>,
}

/// Owns the job registry and the worker pool. Jobs are dispatched by
/// [`Scheduler::run_due_jobs`]; their results are folded back in by
/// [`Scheduler::process_completions`] or [`Scheduler::await_completion`].
pub struct Scheduler {
    registry: Arc<JobRegistry>,
    pool: Mutex<WorkerPool>,
    completions: Mutex<mpsc::UnboundedReceiver<RunCompletion>>,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
}

impl Scheduler {
    /// Starts the worker pool. Must be called inside a tokio runtime.
    pub fn new(settings: SchedulerSettings, clock: Arc<dyn Clock>) -> Self {
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let pool = WorkerPool::start(
            settings.workers,
            settings.failure_policy,
            clock.clone(),
            tx,
            cancel.child_token(),
        );
        Self {
            registry: Arc::new(JobRegistry::new()),
            pool: Mutex::new(pool),
            completions: Mutex::new(rx),
            retry: settings.retry,
            clock,
            cancel,
        }
    }

    pub fn registry(&self) -> Arc<JobRegistry> {
        self.registry.clone()
    }

    pub fn snapshots(&self) -> Vec<JobSnapshot> {
        self.registry.snapshots()
    }

    /// Cancelled when the scheduler shuts down.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn register(
        &self,
        collector: Arc<dyn Collector>,
        schedule: ScheduleSpec,
        targets: Arc<dyn TargetResolver>,
    ) -> Result<()> {
        let job = CollectionJob::new(collector, schedule, targets, self.clock.now());
        info!(
            "Registered job '{}' ({}), first run at {}",
            job.id(),
            schedule,
            job.next_run_at
        );
        self.registry.insert(job)
    }

    /// Like [`Scheduler::register`] with a textual schedule such as
    /// `every 15m` or `daily@06:00`.
    pub fn register_spec(
        &self,
        collector: Arc<dyn Collector>,
        schedule: &str,
        targets: Arc<dyn TargetResolver>,
    ) -> Result<()> {
        self.register(collector, ScheduleSpec::parse(schedule)?, targets)
    }

    /// Dispatches every due job that is not already running. A due job whose
    /// previous run is unfinished is skipped for this tick, not queued.
    pub fn run_due_jobs(&self, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();
        if self.cancel.is_cancelled() {
            return report;
        }

        let mut jobs = self.registry.lock();
        for (id, job) in jobs.iter_mut() {
            if !job.is_due(now) {
                continue;
            }
            if job.state == JobState::Running {
                info!("skipped_overlap: job '{}' is still running", id);
                job.next_run_at = job.schedule.next_after(now);
                report.skipped_overlap.push(id.clone());
                continue;
            }

            let run_id = Uuid::now_v7();
            let dispatch = Dispatch {
                run_id,
                job_id: id.clone(),
                collector: job.collector.clone(),
                targets: job.targets.clone(),
                started_at: now,
            };
            let submitted = match self.pool.try_lock() {
                Ok(pool) => pool.submit(dispatch),
                Err(_) => false,
            };
            if !submitted {
                warn!("Could not dispatch job '{}', worker pool is shutting down", id);
                continue;
            }

            info!(
                "Job '{}' {} -> running (run {})",
                id,
                if job.state == JobState::Retrying { "retrying" } else { "idle" },
                run_id
            );
            job.state = JobState::Running;
            job.running_since = Some(now);
            job.next_run_at = job.schedule.next_after(now);
            report.dispatched.push(id.clone());
        }
        report
    }

    /// Applies every completion that has already arrived.
    pub async fn process_completions(&self) -> Vec<RunCompletion> {
        let mut done = Vec::new();
        let mut rx = self.completions.lock().await;
        while let Ok(completion) = rx.try_recv() {
            self.apply(&completion);
            done.push(completion);
        }
        done
    }

    /// Waits for the next completion and applies it. `None` once the pool is
    /// gone.
    pub async fn await_completion(&self) -> Option<RunCompletion> {
        let completion = self.completions.lock().await.recv().await?;
        self.apply(&completion);
        Some(completion)
    }

    /// Ticks every `tick` until `shutdown` fires, folding completions in as
    /// they arrive.
    pub async fn run(&self, tick: Duration, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    let tick = self.run_due_jobs(self.clock.now());
                    if !tick.dispatched.is_empty() {
                        debug!("Tick dispatched {:?}", tick.dispatched);
                    }
                }
                done = self.await_completion() => {
                    if done.is_none() {
                        break;
                    }
                }
            }
        }
    }

    /// Cancels in-flight runs, waits up to `grace` for workers, then applies
    /// whatever completions arrived.
    pub async fn shutdown(&self, grace: Duration) {
        info!("Scheduler shutting down");
        self.cancel.cancel();
        self.pool.lock().await.shutdown(grace).await;
        self.process_completions().await;
    }

    fn apply(&self, completion: &RunCompletion) {
        let mut jobs = self.registry.lock();
        let Some(job) = jobs.get_mut(&completion.job_id) else {
            warn!("Completion for unknown job '{}'", completion.job_id);
            return;
        };

        job.running_since = None;
        job.last_run = Some(RunSummary {
            run_id: completion.run_id,
            started_at: completion.started_at,
            finished_at: completion.finished_at,
            duration_ms: completion.duration().num_milliseconds(),
            verdict: completion.verdict.clone(),
        });

        match &completion.verdict {
            RunVerdict::Success { failed_count } => {
                info!(
                    "Job '{}' running -> success in {} ms ({} target(s) failed)",
                    completion.job_id,
                    completion.duration().num_milliseconds(),
                    failed_count
                );
                job.state = JobState::Idle;
                job.last_status = LastStatus::Success;
                job.last_success_at = Some(completion.finished_at);
                job.consecutive_failures = 0;
                job.retry_attempts = 0;
                job.exhausted = false;
                job.last_error = None;
            }
            RunVerdict::Failed {
                failed_count,
                total,
                retryable,
                reason,
            } => {
                job.last_status = LastStatus::Failed;
                job.consecutive_failures += 1;
                job.last_error = Some(reason.clone());

                if !retryable {
                    warn!(
                        "Job '{}' running -> failed ({}/{} targets): {}; not retryable, next run at {}",
                        completion.job_id, failed_count, total, reason, job.next_run_at
                    );
                    job.state = JobState::Idle;
                    job.retry_attempts = 0;
                } else if job.retry_attempts >= self.retry.max_retries {
                    job.state = JobState::Idle;
                    job.exhausted = true;
                    job.retry_attempts = 0;
                    job.next_run_at = job.schedule.next_after(completion.finished_at);
                    error!(
                        "Job '{}' failed {} time(s) in a row, retries exhausted: {}; next run at {}",
                        completion.job_id, job.consecutive_failures, reason, job.next_run_at
                    );
                } else {
                    job.retry_attempts += 1;
                    let delay = self.retry.delay_for(job.consecutive_failures);
                    job.next_run_at = completion.finished_at
                        + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero());
                    job.state = JobState::Retrying;
                    warn!(
                        "Job '{}' running -> failed ({}/{} targets): {}; retry {} of {} at {}",
                        completion.job_id,
                        failed_count,
                        total,
                        reason,
                        job.retry_attempts,
                        self.retry.max_retries,
                        job.next_run_at
                    );
                }
            }
            RunVerdict::Cancelled => {
                info!("Job '{}' running -> cancelled", completion.job_id);
                job.state = JobState::Idle;
            }
        }
    }
}

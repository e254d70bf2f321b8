//! Fixed-size pool of tokio tasks that execute collector runs.
//!
//! Dispatches go through one unbounded queue shared by all workers; finished
//! runs come back on a completion channel the scheduler drains.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::collectors::{CollectionReport, Collector, FailurePolicy, RunVerdict};
use crate::targets::TargetResolver;
use crate::utils::Clock;

pub(crate) struct Dispatch {
    pub run_id: Uuid,
    pub job_id: String,
    pub collector: Arc<dyn Collector>,
    pub targets: Arc<dyn TargetResolver>,
    pub started_at: DateTime<Utc>,
}

/// A finished run, as reported back to the scheduler.
#[derive(Debug, Clone)]
pub struct RunCompletion {
    pub run_id: Uuid,
    pub job_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub verdict: RunVerdict,
    /// Absent when the target set could not be resolved.
    pub report: Option<CollectionReport>,
}

impl RunCompletion {
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

pub(crate) struct WorkerPool {
    queue: Option<mpsc::UnboundedSender<Dispatch>>,
    workers: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl WorkerPool {
    pub(crate) fn start(
        size: usize,
        policy: FailurePolicy,
        clock: Arc<dyn Clock>,
        completions: mpsc::UnboundedSender<RunCompletion>,
        cancel: CancellationToken,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel::<Dispatch>();
        let rx = Arc::new(Mutex::new(rx));
        let size = size.max(1);

        let workers = (0..size)
            .map(|n| {
                let rx = rx.clone();
                let clock = clock.clone();
                let completions = completions.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    debug!("Collection worker {} started", n);
                    loop {
                        let next = { rx.lock().await.recv().await };
                        let Some(dispatch) = next else {
                            break;
                        };
                        let completion = execute(dispatch, &policy, clock.as_ref(), &cancel).await;
                        if completions.send(completion).is_err() {
                            debug!("Completion receiver dropped, worker {} exiting", n);
                            break;
                        }
                    }
                    debug!("Collection worker {} stopped", n);
                })
            })
            .collect();

        info!("Started {} collection worker(s)", size);
        Self {
            queue: Some(tx),
            workers,
            cancel,
        }
    }

    pub(crate) fn submit(&self, dispatch: Dispatch) -> bool {
        match &self.queue {
            Some(tx) => tx.send(dispatch).is_ok(),
            None => false,
        }
    }

    /// Stops accepting work, cancels in-flight runs and waits up to `grace`
    /// for workers to finish.
    pub(crate) async fn shutdown(&mut self, grace: Duration) {
        self.queue.take();
        self.cancel.cancel();
        let workers = std::mem::take(&mut self.workers);
        let joined = tokio::time::timeout(grace, futures::future::join_all(workers)).await;
        if joined.is_err() {
            warn!("Workers did not stop within {:?}", grace);
        }
    }
}

async fn execute(
    dispatch: Dispatch,
    policy: &FailurePolicy,
    clock: &dyn Clock,
    cancel: &CancellationToken,
) -> RunCompletion {
    let Dispatch {
        run_id,
        job_id,
        collector,
        targets,
        started_at,
    } = dispatch;

    let (verdict, report) = match targets.resolve().await {
        Ok(targets) => {
            let report = collector.collect(&targets, cancel).await;
            (report.verdict(policy), Some(report))
        }
        Err(e) => {
            warn!("[{}] run {} could not resolve targets: {}", job_id, run_id, e);
            let verdict = RunVerdict::Failed {
                failed_count: 0,
                total: 0,
                retryable: e.is_transient(),
                reason: format!("target resolution failed: {}", e),
            };
            (verdict, None)
        }
    };

    RunCompletion {
        run_id,
        job_id,
        started_at,
        finished_at: clock.now(),
        verdict,
        report,
    }
}

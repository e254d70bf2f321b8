//! Shared plumbing every collector uses: budget gate, provider call,
//! versioned upsert and cache invalidation.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio_util::sync::CancellationToken;

use findash_providers::{ProviderClient, ProviderError};

use super::{CollectionReport, FailureKind, TargetFailure, TargetOutcome, TargetStatus};
use crate::cache::{keys_for_record, CacheLayer};
use crate::errors::Error;
use crate::rate_budget::{Acquire, BudgetReservation, RateBudgetManager};
use crate::records::{CanonicalRecord, VersionClock};
use crate::store::{RecordStore, UpsertOutcome};
use crate::utils::Clock;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollectorSettings {
    /// Longest a target waits for budget inside a run before it is deferred.
    pub acquire_timeout: Duration,
    /// Budget units charged per provider request.
    pub request_cost: u32,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            acquire_timeout: Duration::from_secs(30),
            request_cost: 1,
        }
    }
}

/// Why a provider fetch produced no payload.
#[derive(Debug)]
pub(crate) enum FetchError {
    /// Budget gate said no; carries the status to record.
    Budget(TargetStatus),
    Provider(ProviderError),
    Cancelled,
}

impl FetchError {
    pub(crate) fn into_status(self) -> TargetStatus {
        match self {
            FetchError::Budget(status) => status,
            FetchError::Provider(e) => TargetStatus::Failed(TargetFailure::from_provider(&e)),
            FetchError::Cancelled => TargetStatus::Cancelled,
        }
    }

    /// Another provider might still answer for this target.
    pub(crate) fn allows_fallback(&self) -> bool {
        match self {
            FetchError::Budget(_) => true,
            FetchError::Provider(e) => e.retry_class().is_retryable(),
            FetchError::Cancelled => false,
        }
    }
}

/// Dependencies shared by all collectors of one pipeline.
#[derive(Clone)]
pub struct CollectorContext {
    pub store: Arc<dyn RecordStore>,
    pub cache: Arc<CacheLayer>,
    pub budgets: Arc<RateBudgetManager>,
    pub versions: Arc<VersionClock>,
    pub clock: Arc<dyn Clock>,
    pub settings: CollectorSettings,
}

impl CollectorContext {
    pub fn register_provider<P: ProviderClient + ?Sized>(&self, provider: &P) {
        self.budgets.register(provider.id(), provider.rate_limit());
    }

    /// Version for a fetch that starts now.
    pub(crate) fn next_version(&self) -> i64 {
        self.versions.next(self.clock.now())
    }

    async fn reserve(
        &self,
        provider_id: &str,
        cancel: &CancellationToken,
    ) -> Result<BudgetReservation, FetchError> {
        let cost = self.settings.request_cost;
        let retry_at = match self.budgets.try_acquire(provider_id, cost) {
            Ok(Acquire::Granted(reservation)) => return Ok(reservation),
            Ok(Acquire::Denied { retry_at }) => retry_at,
            Err(e) => {
                return Err(FetchError::Budget(TargetStatus::Failed(
                    TargetFailure::from_error(&e),
                )))
            }
        };

        let until_reset = (retry_at - self.clock.now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        if until_reset > self.settings.acquire_timeout {
            return Err(FetchError::Budget(TargetStatus::Failed(TargetFailure::new(
                FailureKind::RateLimited,
                format!("{} budget exhausted until {}", provider_id, retry_at),
            ))));
        }

        let waited = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            r = self.budgets.acquire_blocking(provider_id, cost, self.settings.acquire_timeout) => r,
        };
        match waited {
            Ok(reservation) => Ok(reservation),
            Err(Error::RateLimitTimeout { provider }) => {
                Err(FetchError::Budget(TargetStatus::Deferred {
                    reason: format!("timed out waiting for {} budget", provider),
                }))
            }
            Err(e) => Err(FetchError::Budget(TargetStatus::Failed(
                TargetFailure::from_error(&e),
            ))),
        }
    }

    /// Reserves budget, runs `call` and commits the reservation once the
    /// request has gone out. Cancellation at any point drops the call and
    /// returns the reservation.
    pub(crate) async fn fetch<T, Fut>(
        &self,
        provider_id: &str,
        cancel: &CancellationToken,
        call: Fut,
    ) -> Result<T, FetchError>
    where
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        let reservation = self.reserve(provider_id, cancel).await?;

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            r = call => r,
        };
        reservation.commit();
        result.map_err(FetchError::Provider)
    }

    /// Upserts the records of one target and invalidates derived cache keys
    /// for each record the store accepted.
    pub(crate) async fn write_records(&self, records: &[CanonicalRecord]) -> TargetStatus {
        let (mut written, mut refreshed, mut stale) = (0, 0, 0);
        for record in records {
            let outcome = match self.store.upsert(record).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(
                        "Store rejected {}/{}: {}",
                        record.entity_type, record.entity_key, e
                    );
                    return TargetStatus::Failed(TargetFailure::from_error(&e));
                }
            };
            match outcome {
                UpsertOutcome::Inserted { .. } | UpsertOutcome::Updated { .. } => written += 1,
                UpsertOutcome::Refreshed { .. } => refreshed += 1,
                UpsertOutcome::Stale { current_version } => {
                    debug!(
                        "Discarded {}/{} v{} (stored v{})",
                        record.entity_type, record.entity_key, record.version, current_version
                    );
                    stale += 1;
                }
            }
            if outcome.is_applied() {
                self.cache.invalidate_all(&keys_for_record(record));
            }
        }
        TargetStatus::Succeeded {
            written,
            refreshed,
            stale,
        }
    }

    /// Runs `per_target` for each target in order, stopping early on
    /// cancellation. Targets not reached are reported as cancelled.
    pub(crate) async fn run_targets<F, Fut>(
        &self,
        collector_id: &str,
        targets: &[String],
        cancel: &CancellationToken,
        mut per_target: F,
    ) -> CollectionReport
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = TargetOutcome>,
    {
        let mut report = CollectionReport::new(collector_id, self.clock.now());
        for target in targets {
            if cancel.is_cancelled() {
                report.cancelled = true;
                report.outcomes.push(TargetOutcome {
                    target: target.clone(),
                    provider: None,
                    status: TargetStatus::Cancelled,
                });
                continue;
            }
            let outcome = per_target(target.clone()).await;
            match &outcome.status {
                TargetStatus::Failed(failure) => warn!(
                    "[{}] {} failed ({:?}): {}",
                    collector_id, outcome.target, failure.kind, failure.message
                ),
                TargetStatus::Deferred { reason } => {
                    debug!("[{}] {} deferred: {}", collector_id, outcome.target, reason)
                }
                TargetStatus::Cancelled => report.cancelled = true,
                TargetStatus::Succeeded { .. } => {}
            }
            report.outcomes.push(outcome);
        }
        report.finished_at = self.clock.now();
        report
    }
}

/// Upper-cases and trims ticker targets, dropping blanks.
pub(crate) fn normalize_symbol(target: &str) -> Option<String> {
    let symbol = target.trim().to_ascii_uppercase();
    if symbol.is_empty() {
        None
    } else {
        Some(symbol)
    }
}

pub(crate) fn blank_target(target: String) -> TargetOutcome {
    TargetOutcome {
        target,
        provider: None,
        status: TargetStatus::Failed(TargetFailure::new(
            FailureKind::Rejected,
            "empty target",
        )),
    }
}

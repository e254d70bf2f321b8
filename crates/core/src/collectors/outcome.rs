//! Per-target outcomes and the run verdict derived from them.

use chrono::{DateTime, Utc};
use serde::Serialize;

use findash_providers::{ProviderError, RetryClass};

use crate::errors::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Timeout, 5xx or dropped connection.
    Transient,
    /// Provider quota spent, locally or upstream.
    RateLimited,
    /// Payload could not be decoded or normalized.
    Malformed,
    NotFound,
    Rejected,
    /// The store refused the write.
    Store,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl TargetFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn from_provider(err: &ProviderError) -> Self {
        let kind = match (err.retry_class(), err) {
            (RetryClass::WithBackoff, _) => FailureKind::Transient,
            (RetryClass::AfterWindowReset, _) => FailureKind::RateLimited,
            (RetryClass::Never, ProviderError::NotFound { .. }) => FailureKind::NotFound,
            (RetryClass::Never, ProviderError::Malformed { .. }) => FailureKind::Malformed,
            (RetryClass::Never, _) => FailureKind::Rejected,
        };
        Self::new(kind, err.to_string())
    }

    pub fn from_error(err: &Error) -> Self {
        let kind = match err {
            Error::Provider(e) => return Self::from_provider(e),
            Error::Database(_) => FailureKind::Store,
            Error::Normalization(_) => FailureKind::Malformed,
            Error::RateLimitExceeded { .. } | Error::RateLimitTimeout { .. } => {
                FailureKind::RateLimited
            }
            _ => FailureKind::Internal,
        };
        Self::new(kind, err.to_string())
    }

    /// A later run with backoff may succeed where this one failed.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, FailureKind::Transient | FailureKind::Store)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum TargetStatus {
    Succeeded {
        written: usize,
        refreshed: usize,
        stale: usize,
    },
    Failed(TargetFailure),
    /// Skipped this run; picked up again on the next scheduled run.
    Deferred { reason: String },
    Cancelled,
}

impl TargetStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, TargetStatus::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetOutcome {
    pub target: String,
    /// Provider that produced the data, or the last one tried.
    pub provider: Option<String>,
    pub status: TargetStatus,
}

/// Share of failed targets above which a run counts as failed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FailurePolicy {
    pub max_failed_fraction: f64,
}

impl Default for FailurePolicy {
    /// A run fails only when most of its targets failed.
    fn default() -> Self {
        Self {
            max_failed_fraction: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "verdict")]
pub enum RunVerdict {
    Success {
        failed_count: usize,
    },
    Failed {
        failed_count: usize,
        total: usize,
        /// False when every failure is one that backoff cannot fix
        /// (quota, malformed payload, unknown symbol).
        retryable: bool,
        reason: String,
    },
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionReport {
    pub collector_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<TargetOutcome>,
    pub cancelled: bool,
}

impl CollectionReport {
    pub fn new(collector_id: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            collector_id: collector_id.into(),
            started_at,
            finished_at: started_at,
            outcomes: Vec::new(),
            cancelled: false,
        }
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.status.is_failed()).count()
    }

    pub fn succeeded_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, TargetStatus::Succeeded { .. }))
            .count()
    }

    pub fn deferred_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, TargetStatus::Deferred { .. }))
            .count()
    }

    pub fn written_count(&self) -> usize {
        self.outcomes
            .iter()
            .map(|o| match o.status {
                TargetStatus::Succeeded { written, .. } => written,
                _ => 0,
            })
            .sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &TargetFailure)> {
        self.outcomes.iter().filter_map(|o| match &o.status {
            TargetStatus::Failed(f) => Some((o.target.as_str(), f)),
            _ => None,
        })
    }

    pub fn verdict(&self, policy: &FailurePolicy) -> RunVerdict {
        if self.cancelled {
            return RunVerdict::Cancelled;
        }
        // Deferred targets were never attempted.
        let total = self.outcomes.len() - self.deferred_count();
        let failed_count = self.failed_count();
        if total == 0 || (failed_count as f64 / total as f64) <= policy.max_failed_fraction {
            return RunVerdict::Success { failed_count };
        }

        let retryable = self.failures().any(|(_, f)| f.is_retryable());
        let reason = self
            .failures()
            .next()
            .map(|(target, f)| format!("{}: {}", target, f.message))
            .unwrap_or_default();
        RunVerdict::Failed {
            failed_count,
            total,
            retryable,
            reason,
        }
    }
}

//! Monotonic version stamps for canonical records.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};

/// Hands out strictly increasing versions.
///
/// A version is taken when a target's fetch begins, so a run that started
/// earlier always carries a lower version than one that started later, no
/// matter which finishes first. Versions track wall-clock microseconds, and
/// a clock seeded with [`VersionClock::starting_after`] from the store's
/// highest version stays ahead of it even if the wall clock stepped back
/// across a restart.
#[derive(Debug, Default)]
pub struct VersionClock {
    last: AtomicI64,
}

impl VersionClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue after `floor`, e.g. the highest version already stored.
    pub fn starting_after(floor: i64) -> Self {
        Self {
            last: AtomicI64::new(floor),
        }
    }

    pub fn next(&self, now: DateTime<Utc>) -> i64 {
        let wall = now.timestamp_micros();
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = wall.max(prev + 1);
            match self
                .last
                .compare_exchange_weak(prev, candidate, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return candidate,
                Err(actual) => prev = actual,
            }
        }
    }
}

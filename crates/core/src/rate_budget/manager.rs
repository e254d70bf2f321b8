//! Shared, per-provider request budgets.
//!
//! Several collectors can call the same provider, so budgets live here
//! rather than inside any one collector. Each provider has its own lock;
//! contention on one provider never stalls another.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use findash_providers::RateLimit;

use super::RateBudget;
use crate::errors::{Error, Result};
use crate::utils::Clock;

struct ProviderBudget {
    state: Mutex<RateBudget>,
    /// Signalled when units come back (refund or window rollover).
    released: Notify,
}

impl ProviderBudget {
    fn lock(&self) -> MutexGuard<'_, RateBudget> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!("Rate budget mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

/// Units taken from a provider budget.
///
/// Call [`commit`](Self::commit) once the provider call has been issued.
/// Dropping an uncommitted reservation (for example because the run was
/// cancelled while waiting) returns the units to the window they came from.
#[must_use = "dropping a reservation without commit() refunds it"]
pub struct BudgetReservation {
    budget: Arc<ProviderBudget>,
    provider_id: String,
    cost: u32,
    window_start: DateTime<Utc>,
    committed: bool,
}

impl BudgetReservation {
    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for BudgetReservation {
    fn drop(&mut self) {
        if self.committed || self.cost == 0 {
            return;
        }
        self.budget.lock().refund(self.cost, self.window_start);
        self.budget.released.notify_waiters();
        debug!(
            "Refunded {} unit(s) of {} budget",
            self.cost, self.provider_id
        );
    }
}

impl std::fmt::Debug for BudgetReservation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BudgetReservation")
            .field("provider_id", &self.provider_id)
            .field("cost", &self.cost)
            .field("window_start", &self.window_start)
            .field("committed", &self.committed)
            .finish()
    }
}

/// Result of a non-blocking acquire.
#[derive(Debug)]
pub enum Acquire {
    Granted(BudgetReservation),
    /// Not enough room before `retry_at`, the end of the current window.
    Denied { retry_at: DateTime<Utc> },
}

impl Acquire {
    pub fn is_granted(&self) -> bool {
        matches!(self, Acquire::Granted(_))
    }
}

pub struct RateBudgetManager {
    budgets: RwLock<HashMap<String, Arc<ProviderBudget>>>,
    clock: Arc<dyn Clock>,
}

impl RateBudgetManager {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            budgets: RwLock::new(HashMap::new()),
            clock,
        }
    }

    fn read_budgets(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<ProviderBudget>>> {
        self.budgets.read().unwrap_or_else(|poisoned| {
            warn!("Rate budget registry lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write_budgets(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<ProviderBudget>>> {
        self.budgets.write().unwrap_or_else(|poisoned| {
            warn!("Rate budget registry lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn budget(&self, provider_id: &str) -> Result<Arc<ProviderBudget>> {
        self.read_budgets()
            .get(provider_id)
            .cloned()
            .ok_or_else(|| Error::UnknownProvider(provider_id.to_string()))
    }

    /// Declares a provider's budget. The first declaration wins, so clients
    /// that share an upstream can all register without resetting the count.
    pub fn register(&self, provider_id: &str, rate_limit: RateLimit) {
        let now = self.clock.now();
        self.write_budgets()
            .entry(provider_id.to_string())
            .or_insert_with(|| {
                debug!(
                    "Registered {} budget: {} per {}",
                    provider_id, rate_limit.limit, rate_limit.window
                );
                Arc::new(ProviderBudget {
                    state: Mutex::new(RateBudget::new(provider_id, rate_limit, now)),
                    released: Notify::new(),
                })
            });
    }

    /// Replaces a provider's declared limit (configuration override).
    pub fn set_limit(&self, provider_id: &str, rate_limit: RateLimit) {
        let now = self.clock.now();
        let mut budgets = self.write_budgets();
        match budgets.get(provider_id) {
            Some(budget) => {
                budget.lock().set_limit(rate_limit, now);
                budget.released.notify_waiters();
            }
            None => {
                budgets.insert(
                    provider_id.to_string(),
                    Arc::new(ProviderBudget {
                        state: Mutex::new(RateBudget::new(provider_id, rate_limit, now)),
                        released: Notify::new(),
                    }),
                );
            }
        }
        info!(
            "{} budget set to {} per {}",
            provider_id, rate_limit.limit, rate_limit.window
        );
    }

    /// Takes `cost` units now or reports when the window ends.
    pub fn try_acquire(&self, provider_id: &str, cost: u32) -> Result<Acquire> {
        let budget = self.budget(provider_id)?;
        let now = self.clock.now();
        let mut state = budget.lock();
        if state.try_take(cost, now) {
            let window_start = state.window_start;
            drop(state);
            Ok(Acquire::Granted(BudgetReservation {
                budget,
                provider_id: provider_id.to_string(),
                cost,
                window_start,
                committed: false,
            }))
        } else {
            Ok(Acquire::Denied {
                retry_at: state.window_end(),
            })
        }
    }

    /// Waits until `cost` units are available or `timeout` elapses.
    ///
    /// Returns [`Error::RateLimitTimeout`] on timeout, and
    /// [`Error::RateLimitExceeded`] straight away when `cost` exceeds the
    /// provider's whole window limit.
    pub async fn acquire_blocking(
        &self,
        provider_id: &str,
        cost: u32,
        timeout: Duration,
    ) -> Result<BudgetReservation> {
        let budget = self.budget(provider_id)?;
        let deadline = Instant::now() + timeout;

        loop {
            let released = budget.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();

            let retry_at = match self.try_acquire(provider_id, cost)? {
                Acquire::Granted(reservation) => return Ok(reservation),
                Acquire::Denied { retry_at } => retry_at,
            };

            if cost > budget.lock().limit {
                return Err(Error::RateLimitExceeded {
                    provider: provider_id.to_string(),
                    retry_at,
                });
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(Error::RateLimitTimeout {
                    provider: provider_id.to_string(),
                });
            }

            let until_reset = (retry_at - self.clock.now())
                .to_std()
                .unwrap_or(Duration::ZERO);
            let wait = (deadline - now).min(until_reset.max(Duration::from_millis(1)));
            debug!(
                "Waiting up to {:?} for {} budget (cost {})",
                wait, provider_id, cost
            );
            let _ = tokio::time::timeout(wait, released).await;
        }
    }

    /// Rolls every budget whose window has ended. Safe to call at any time;
    /// calling twice in the same window is a no-op.
    pub fn roll_windows(&self) -> usize {
        self.roll_windows_at(self.clock.now())
    }

    pub fn roll_windows_at(&self, now: DateTime<Utc>) -> usize {
        let budgets: Vec<Arc<ProviderBudget>> = self.read_budgets().values().cloned().collect();
        let mut rolled = 0;
        for budget in budgets {
            let did_roll = budget.lock().roll_if_due(now);
            if did_roll {
                rolled += 1;
                budget.released.notify_waiters();
            }
        }
        if rolled > 0 {
            debug!("Rolled {} rate budget window(s)", rolled);
        }
        rolled
    }

    /// Runs [`roll_windows`](Self::roll_windows) every `period` until cancelled.
    pub async fn run_rollover(&self, period: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.roll_windows();
                }
            }
        }
        debug!("Rate budget rollover loop stopped");
    }

    pub fn snapshot(&self, provider_id: &str) -> Option<RateBudget> {
        self.read_budgets()
            .get(provider_id)
            .map(|budget| budget.lock().clone())
    }

    pub fn snapshots(&self) -> Vec<RateBudget> {
        let mut all: Vec<RateBudget> = self
            .read_budgets()
            .values()
            .map(|budget| budget.lock().clone())
            .collect();
        all.sort_by(|a, b| a.provider_id.cmp(&b.provider_id));
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::ManualClock;
    use chrono::TimeZone;

    fn manager_at(now: DateTime<Utc>) -> (Arc<ManualClock>, RateBudgetManager) {
        let clock = Arc::new(ManualClock::new(now));
        let manager = RateBudgetManager::new(clock.clone());
        (clock, manager)
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 5, 9, 30, 0).unwrap()
    }

    #[test]
    fn test_unknown_provider_is_an_error() {
        let (_, manager) = manager_at(start());
        assert!(matches!(
            manager.try_acquire("NOPE", 1),
            Err(Error::UnknownProvider(_))
        ));
    }

    #[test]
    fn test_first_registration_wins() {
        let (_, manager) = manager_at(start());
        manager.register("ALPHA_VANTAGE", RateLimit::per_day(25));
        manager.register("ALPHA_VANTAGE", RateLimit::per_minute(5));
        let snapshot = manager.snapshot("ALPHA_VANTAGE").unwrap();
        assert_eq!(snapshot.limit, 25);
    }

    #[test]
    fn test_exhausted_daily_budget_is_denied_until_midnight() {
        let (clock, manager) = manager_at(start());
        manager.register("ALPHA_VANTAGE", RateLimit::per_day(25));
        for _ in 0..25 {
            match manager.try_acquire("ALPHA_VANTAGE", 1).unwrap() {
                Acquire::Granted(r) => r.commit(),
                Acquire::Denied { .. } => panic!("should grant"),
            }
        }
        match manager.try_acquire("ALPHA_VANTAGE", 1).unwrap() {
            Acquire::Denied { retry_at } => {
                assert_eq!(retry_at, Utc.with_ymd_and_hms(2024, 1, 6, 0, 0, 0).unwrap())
            }
            Acquire::Granted(_) => panic!("should deny"),
        }

        clock.set(Utc.with_ymd_and_hms(2024, 1, 6, 0, 0, 1).unwrap());
        assert_eq!(manager.roll_windows(), 1);
        assert_eq!(manager.roll_windows(), 0);
        assert!(manager.try_acquire("ALPHA_VANTAGE", 1).unwrap().is_granted());
    }

    #[test]
    fn test_dropped_reservation_is_refunded() {
        let (_, manager) = manager_at(start());
        manager.register("REDDIT", RateLimit::per_minute(2));
        {
            let _held = manager.try_acquire("REDDIT", 2).unwrap();
            assert_eq!(manager.snapshot("REDDIT").unwrap().used, 2);
        }
        assert_eq!(manager.snapshot("REDDIT").unwrap().used, 0);

        if let Acquire::Granted(r) = manager.try_acquire("REDDIT", 1).unwrap() {
            r.commit();
        }
        assert_eq!(manager.snapshot("REDDIT").unwrap().used, 1);
    }

    #[tokio::test]
    async fn test_acquire_blocking_times_out() {
        let (_, manager) = manager_at(start());
        manager.register("YAHOO", RateLimit::per_hour(1));
        if let Acquire::Granted(r) = manager.try_acquire("YAHOO", 1).unwrap() {
            r.commit();
        }
        let err = manager
            .acquire_blocking("YAHOO", 1, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RateLimitTimeout { .. }));
    }

    #[tokio::test]
    async fn test_acquire_blocking_rejects_cost_above_limit() {
        let (_, manager) = manager_at(start());
        manager.register("YAHOO", RateLimit::per_minute(3));
        let err = manager
            .acquire_blocking("YAHOO", 4, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RateLimitExceeded { .. }));
    }

    #[tokio::test]
    async fn test_acquire_blocking_wakes_on_refund() {
        let (_, manager) = manager_at(start());
        let manager = Arc::new(manager);
        manager.register("OPENINSIDER", RateLimit::per_minute(1));
        let held = match manager.try_acquire("OPENINSIDER", 1).unwrap() {
            Acquire::Granted(r) => r,
            Acquire::Denied { .. } => panic!("should grant"),
        };

        let waiter = {
            let manager = manager.clone();
            tokio::spawn(async move {
                manager
                    .acquire_blocking("OPENINSIDER", 1, Duration::from_secs(5))
                    .await
                    .map(|r| r.commit())
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(held);

        waiter.await.unwrap().unwrap();
        assert_eq!(manager.snapshot("OPENINSIDER").unwrap().used, 1);
    }

    #[tokio::test]
    async fn test_acquire_blocking_wakes_on_rollover() {
        let (clock, manager) = manager_at(start());
        let manager = Arc::new(manager);
        manager.register("REDDIT", RateLimit::per_minute(1));
        if let Acquire::Granted(r) = manager.try_acquire("REDDIT", 1).unwrap() {
            r.commit();
        }

        let waiter = {
            let manager = manager.clone();
            tokio::spawn(async move {
                manager
                    .acquire_blocking("REDDIT", 1, Duration::from_secs(5))
                    .await
                    .map(|r| r.commit())
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        clock.advance(chrono::Duration::minutes(1));
        manager.roll_windows();

        waiter.await.unwrap().unwrap();
    }
}

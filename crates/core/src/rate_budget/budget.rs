use chrono::{DateTime, Utc};
use serde::Serialize;

use findash_providers::{RateLimit, WindowKind};

/// Request counter for one provider over one fixed window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateBudget {
    pub provider_id: String,
    pub window_kind: WindowKind,
    pub limit: u32,
    pub window_start: DateTime<Utc>,
    pub used: u32,
}

impl RateBudget {
    pub fn new(provider_id: impl Into<String>, rate_limit: RateLimit, now: DateTime<Utc>) -> Self {
        Self {
            provider_id: provider_id.into(),
            window_kind: rate_limit.window,
            limit: rate_limit.limit,
            window_start: rate_limit.window.window_start(now),
            used: 0,
        }
    }

    pub fn window_end(&self) -> DateTime<Utc> {
        self.window_kind.window_end(self.window_start)
    }

    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.used)
    }

    /// Starts a fresh window once `now` has passed the current one.
    /// Calling it again inside the same window changes nothing.
    pub fn roll_if_due(&mut self, now: DateTime<Utc>) -> bool {
        if now >= self.window_end() {
            self.window_start = self.window_kind.window_start(now);
            self.used = 0;
            true
        } else {
            false
        }
    }

    /// Takes `cost` units if they fit in the current window.
    pub(crate) fn try_take(&mut self, cost: u32, now: DateTime<Utc>) -> bool {
        self.roll_if_due(now);
        match self.used.checked_add(cost) {
            Some(total) if total <= self.limit => {
                self.used = total;
                true
            }
            _ => false,
        }
    }

    /// Gives back units taken in the window starting at `window_start`.
    /// Units from an earlier window are gone with that window.
    pub(crate) fn refund(&mut self, cost: u32, window_start: DateTime<Utc>) {
        if self.window_start == window_start {
            self.used = self.used.saturating_sub(cost);
        }
    }

    pub(crate) fn set_limit(&mut self, rate_limit: RateLimit, now: DateTime<Utc>) {
        if self.window_kind != rate_limit.window {
            self.window_kind = rate_limit.window;
            self.window_start = rate_limit.window.window_start(now);
            self.used = 0;
        }
        self.limit = rate_limit.limit;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 5, h, m, s).unwrap()
    }

    #[test]
    fn test_denies_past_limit() {
        let mut budget = RateBudget::new("X", RateLimit::per_minute(3), at(10, 0, 5));
        assert!(budget.try_take(2, at(10, 0, 6)));
        assert!(!budget.try_take(2, at(10, 0, 7)));
        assert!(budget.try_take(1, at(10, 0, 8)));
        assert_eq!(budget.remaining(), 0);
    }

    #[test]
    fn test_rolls_at_window_end() {
        let mut budget = RateBudget::new("X", RateLimit::per_minute(1), at(10, 0, 5));
        assert!(budget.try_take(1, at(10, 0, 6)));
        assert!(!budget.try_take(1, at(10, 0, 59)));
        assert!(budget.try_take(1, at(10, 1, 0)));
        assert_eq!(budget.window_start, at(10, 1, 0));
    }

    #[test]
    fn test_roll_is_idempotent() {
        let mut budget = RateBudget::new("X", RateLimit::per_hour(10), at(10, 15, 0));
        budget.used = 4;
        assert!(budget.roll_if_due(at(11, 2, 0)));
        assert!(!budget.roll_if_due(at(11, 2, 0)));
        assert!(!budget.roll_if_due(at(11, 59, 59)));
        assert_eq!(budget.window_start, at(11, 0, 0));
        assert_eq!(budget.used, 0);
    }

    #[test]
    fn test_refund_ignores_previous_window() {
        let mut budget = RateBudget::new("X", RateLimit::per_day(25), at(10, 0, 0));
        let old_window = budget.window_start;
        assert!(budget.try_take(1, at(10, 0, 0)));
        budget.roll_if_due(at(10, 0, 0) + Duration::days(1));
        assert!(budget.try_take(1, at(10, 0, 0) + Duration::days(1)));
        budget.refund(1, old_window);
        assert_eq!(budget.used, 1);
    }
}

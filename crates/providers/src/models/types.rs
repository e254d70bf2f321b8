//! Shared types used across provider clients.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Type alias for provider identifier.
pub type ProviderId = Cow<'static, str>;

/// Fixed, clock-aligned window over which a provider counts requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowKind {
    Minute,
    Hour,
    Day,
}

impl WindowKind {
    pub fn duration(&self) -> Duration {
        match self {
            WindowKind::Minute => Duration::from_secs(60),
            WindowKind::Hour => Duration::from_secs(60 * 60),
            WindowKind::Day => Duration::from_secs(24 * 60 * 60),
        }
    }

    fn delta(&self) -> TimeDelta {
        match self {
            WindowKind::Minute => TimeDelta::minutes(1),
            WindowKind::Hour => TimeDelta::hours(1),
            WindowKind::Day => TimeDelta::days(1),
        }
    }

    /// Start of the window containing `now`, aligned to UTC boundaries.
    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.duration_trunc(self.delta()).unwrap_or(now)
    }

    /// End (exclusive) of the window that starts at `start`.
    pub fn window_end(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        start + self.delta()
    }
}

impl fmt::Display for WindowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WindowKind::Minute => "minute",
            WindowKind::Hour => "hour",
            WindowKind::Day => "day",
        };
        f.write_str(s)
    }
}

impl FromStr for WindowKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "minute" | "min" | "m" => Ok(WindowKind::Minute),
            "hour" | "h" => Ok(WindowKind::Hour),
            "day" | "d" => Ok(WindowKind::Day),
            other => Err(format!("unknown rate window '{}'", other)),
        }
    }
}

/// Declared request budget of a provider: `limit` requests per fixed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    pub limit: u32,
    pub window: WindowKind,
}

impl RateLimit {
    pub const fn per_minute(limit: u32) -> Self {
        Self {
            limit,
            window: WindowKind::Minute,
        }
    }

    pub const fn per_hour(limit: u32) -> Self {
        Self {
            limit,
            window: WindowKind::Hour,
        }
    }

    pub const fn per_day(limit: u32) -> Self {
        Self {
            limit,
            window: WindowKind::Day,
        }
    }
}

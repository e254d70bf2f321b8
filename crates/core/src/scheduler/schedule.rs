//! When a job runs: a fixed interval or once a day at a UTC wall-clock time.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ScheduleSpec {
    FixedInterval(Duration),
    /// Once a day at this UTC time.
    DailyAt(NaiveTime),
}

impl ScheduleSpec {
    pub fn every(interval: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(Error::Config("schedule interval must be positive".into()));
        }
        Ok(ScheduleSpec::FixedInterval(interval))
    }

    pub fn daily_at(hour: u32, minute: u32) -> Result<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0)
            .map(ScheduleSpec::DailyAt)
            .ok_or_else(|| Error::Config(format!("invalid time of day {:02}:{:02}", hour, minute)))
    }

    /// Parses `every <n><s|m|h|d>` or `daily@HH:MM`.
    pub fn parse(raw: &str) -> Result<Self> {
        let s = raw.trim().to_ascii_lowercase();
        if let Some(rest) = s.strip_prefix("every ") {
            return Self::every(parse_interval(rest.trim()).ok_or_else(|| bad(raw))?);
        }
        if let Some(rest) = s.strip_prefix("daily@") {
            let time = NaiveTime::parse_from_str(rest.trim(), "%H:%M").map_err(|_| bad(raw))?;
            return Ok(ScheduleSpec::DailyAt(time));
        }
        Err(bad(raw))
    }

    /// First run time after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            ScheduleSpec::FixedInterval(interval) => chrono::Duration::from_std(*interval)
                .ok()
                .and_then(|d| now.checked_add_signed(d))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            ScheduleSpec::DailyAt(time) => {
                let today = now.date_naive().and_time(*time).and_utc();
                if today > now {
                    today
                } else {
                    today + chrono::Duration::days(1)
                }
            }
        }
    }

    /// When a freshly registered job first runs. Interval jobs start right
    /// away; daily jobs wait for their slot.
    pub fn first_run(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            ScheduleSpec::FixedInterval(_) => now,
            ScheduleSpec::DailyAt(_) => self.next_after(now),
        }
    }
}

fn bad(raw: &str) -> Error {
    Error::Config(format!(
        "malformed schedule '{}', expected 'every <n><s|m|h|d>' or 'daily@HH:MM'",
        raw
    ))
}

fn parse_interval(s: &str) -> Option<Duration> {
    let unit = s.chars().last()?;
    let n: u64 = s[..s.len() - unit.len_utf8()].trim().parse().ok()?;
    let secs = match unit {
        's' => n,
        'm' => n.checked_mul(60)?,
        'h' => n.checked_mul(3600)?,
        'd' => n.checked_mul(86_400)?,
        _ => return None,
    };
    Some(Duration::from_secs(secs))
}

impl fmt::Display for ScheduleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleSpec::FixedInterval(d) => {
                let secs = d.as_secs();
                if secs % 86_400 == 0 {
                    write!(f, "every {}d", secs / 86_400)
                } else if secs % 3600 == 0 {
                    write!(f, "every {}h", secs / 3600)
                } else if secs % 60 == 0 {
                    write!(f, "every {}m", secs / 60)
                } else {
                    write!(f, "every {}s", secs)
                }
            }
            ScheduleSpec::DailyAt(t) => write!(f, "daily@{}", t.format("%H:%M")),
        }
    }
}

impl FromStr for ScheduleSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ScheduleSpec {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<ScheduleSpec> for String {
    fn from(spec: ScheduleSpec) -> String {
        spec.to_string()
    }
}

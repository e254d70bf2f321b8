//! Static pipeline configuration, loaded once at startup.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use findash_providers::RateLimit;

use crate::cache::TtlPolicy;
use crate::collectors::{fundamentals, insider, market_data, retention, sentiment};
use crate::collectors::{CollectorSettings, FailurePolicy};
use crate::errors::{Error, Result};
use crate::records::EntityType;
use crate::scheduler::{RetryPolicy, ScheduleSpec, SchedulerSettings};

pub const DEFAULT_TICKERS: &[&str] = &["SPY", "QQQ", "DIA", "AAPL", "MSFT", "GOOGL"];
pub const DEFAULT_SUBREDDITS: &[&str] =
    &["wallstreetbets", "stocks", "investing", "StockMarket", "pennystocks"];

const KNOWN_COLLECTORS: &[&str] = &[
    market_data::COLLECTOR_ID,
    fundamentals::COLLECTOR_ID,
    insider::COLLECTOR_ID,
    sentiment::COLLECTOR_ID,
    retention::COLLECTOR_ID,
];

/// One row of the schedule table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConfig {
    pub collector_id: String,
    pub schedule: ScheduleSpec,
    #[serde(default)]
    pub targets: Vec<String>,
}

impl JobConfig {
    pub fn new<S: Into<String>>(
        collector_id: &str,
        schedule: ScheduleSpec,
        targets: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            collector_id: collector_id.to_string(),
            schedule,
            targets: targets.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineConfig {
    pub workers: usize,
    pub jobs: Vec<JobConfig>,
    pub retry: RetryPolicy,
    /// A run fails when more than this share of its targets failed.
    pub max_failed_fraction: f64,
    pub acquire_timeout_secs: u64,
    /// Overrides of the built-in cache TTLs.
    pub cache_ttl_secs: BTreeMap<EntityType, u64>,
    /// Overrides of the limits providers declare, keyed by provider id.
    pub rate_limits: BTreeMap<String, RateLimit>,
    pub price_lookback_days: u32,
    pub reddit_post_limit: u32,
    /// Best-scored posts per subreddit whose comments are read; 0 disables.
    pub reddit_comment_posts: usize,
    pub reddit_comment_limit: u32,
    /// Days each entity type is kept by the retention job.
    pub retention_days: BTreeMap<EntityType, u32>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let every = |secs| ScheduleSpec::FixedInterval(Duration::from_secs(secs));
        let daily = |h, m| {
            ScheduleSpec::DailyAt(chrono::NaiveTime::from_hms_opt(h, m, 0).unwrap_or_default())
        };
        let retention_days: BTreeMap<EntityType, u32> =
            retention::DEFAULT_RETENTION_DAYS.iter().copied().collect();
        let retention_targets: Vec<&str> = retention_days.keys().map(EntityType::as_str).collect();
        Self {
            workers: 4,
            jobs: vec![
                JobConfig::new(market_data::COLLECTOR_ID, every(15 * 60), DEFAULT_TICKERS.iter().copied()),
                JobConfig::new(sentiment::COLLECTOR_ID, every(3600), DEFAULT_SUBREDDITS.iter().copied()),
                JobConfig::new(insider::COLLECTOR_ID, daily(6, 0), DEFAULT_TICKERS.iter().copied()),
                JobConfig::new(fundamentals::COLLECTOR_ID, daily(7, 0), DEFAULT_TICKERS.iter().copied()),
                JobConfig::new(retention::COLLECTOR_ID, daily(2, 0), retention_targets),
            ],
            retry: RetryPolicy::default(),
            max_failed_fraction: FailurePolicy::default().max_failed_fraction,
            acquire_timeout_secs: CollectorSettings::default().acquire_timeout.as_secs(),
            cache_ttl_secs: BTreeMap::new(),
            rate_limits: BTreeMap::new(),
            price_lookback_days: 5,
            reddit_post_limit: sentiment::DEFAULT_POST_LIMIT,
            reddit_comment_posts: sentiment::DEFAULT_COMMENT_POSTS,
            reddit_comment_limit: sentiment::DEFAULT_COMMENT_LIMIT,
            retention_days,
        }
    }
}

impl PipelineConfig {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|e| Error::Config(format!("pipeline config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::Config("workers must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.max_failed_fraction) {
            return Err(Error::Config(format!(
                "maxFailedFraction must be within [0, 1], got {}",
                self.max_failed_fraction
            )));
        }
        if self.acquire_timeout_secs == 0 {
            return Err(Error::Config("acquireTimeoutSecs must be positive".into()));
        }
        if !(1..=100).contains(&self.reddit_post_limit) {
            return Err(Error::Config("redditPostLimit must be within 1..=100".into()));
        }
        if !(1..=100).contains(&self.reddit_comment_limit) {
            return Err(Error::Config("redditCommentLimit must be within 1..=100".into()));
        }
        if let Some((t, _)) = self.retention_days.iter().find(|(_, days)| **days == 0) {
            return Err(Error::Config(format!("retention for {} must be positive", t)));
        }
        if self.retry.base.is_zero() || self.retry.max_delay < self.retry.base {
            return Err(Error::Config(
                "retry base must be positive and no larger than maxDelay".into(),
            ));
        }
        if let Some((t, _)) = self.cache_ttl_secs.iter().find(|(_, secs)| **secs == 0) {
            return Err(Error::Config(format!("cache TTL for {} must be positive", t)));
        }
        if let Some((p, _)) = self.rate_limits.iter().find(|(_, l)| l.limit == 0) {
            return Err(Error::Config(format!("rate limit for {} must be positive", p)));
        }

        let mut seen = HashSet::new();
        for job in &self.jobs {
            if !KNOWN_COLLECTORS.contains(&job.collector_id.as_str()) {
                return Err(Error::UnknownCollector(job.collector_id.clone()));
            }
            if !seen.insert(job.collector_id.as_str()) {
                return Err(Error::Config(format!(
                    "collector '{}' is scheduled twice",
                    job.collector_id
                )));
            }
            if job.targets.iter().all(|t| t.trim().is_empty()) {
                return Err(Error::Config(format!(
                    "job '{}' has no targets",
                    job.collector_id
                )));
            }
            if job.collector_id == retention::COLLECTOR_ID {
                for target in &job.targets {
                    let entity_type: EntityType = target.trim().parse()?;
                    if !self.retention_days.contains_key(&entity_type) {
                        return Err(Error::Config(format!(
                            "no retention period for {}",
                            entity_type
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn job(&self, collector_id: &str) -> Option<&JobConfig> {
        self.jobs.iter().find(|j| j.collector_id == collector_id)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy {
            max_failed_fraction: self.max_failed_fraction,
        }
    }

    pub fn ttl_policy(&self) -> TtlPolicy {
        self.cache_ttl_secs
            .iter()
            .fold(TtlPolicy::default(), |policy, (entity_type, secs)| {
                policy.with(*entity_type, Duration::from_secs(*secs))
            })
    }

    pub fn collector_settings(&self) -> CollectorSettings {
        CollectorSettings {
            acquire_timeout: Duration::from_secs(self.acquire_timeout_secs),
            ..CollectorSettings::default()
        }
    }

    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            workers: self.workers,
            retry: self.retry_policy(),
            failure_policy: self.failure_policy(),
        }
    }
}

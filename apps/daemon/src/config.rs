use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;

use findash_core::config::{PipelineConfig, DEFAULT_SUBREDDITS};
use findash_core::collectors::{fundamentals, retention, sentiment};

pub struct Config {
    pub db_path: String,
    pub workers: Option<usize>,
    pub tick_interval: Duration,
    pub rollover_interval: Duration,
    pub cache_purge_interval: Duration,
    pub shutdown_grace: Duration,
    pub alpha_vantage_api_key: Option<String>,
    /// Replaces the targets of every ticker-based job.
    pub watchlist: Vec<String>,
    pub subreddits: Vec<String>,
    pub jobs_file: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let db_path = std::env::var("FINDASH_DB_PATH").unwrap_or_else(|_| "./db/findash.db".into());
        let workers = match std::env::var("FINDASH_WORKERS") {
            Ok(raw) => Some(raw.parse().context("Invalid FINDASH_WORKERS")?),
            Err(_) => None,
        };
        let alpha_vantage_api_key = std::env::var("FINDASH_ALPHA_VANTAGE_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());
        let watchlist = std::env::var("FINDASH_WATCHLIST")
            .map(|raw| split_list(&raw, true))
            .unwrap_or_default();
        let subreddits = std::env::var("FINDASH_SUBREDDITS")
            .map(|raw| split_list(&raw, false))
            .unwrap_or_else(|_| DEFAULT_SUBREDDITS.iter().map(|s| s.to_string()).collect());
        let jobs_file = std::env::var("FINDASH_JOBS_FILE").ok().map(PathBuf::from);

        Ok(Self {
            db_path,
            workers,
            tick_interval: secs_var("FINDASH_TICK_SECS", 1)?,
            rollover_interval: secs_var("FINDASH_ROLLOVER_SECS", 1)?,
            cache_purge_interval: secs_var("FINDASH_CACHE_PURGE_SECS", 300)?,
            shutdown_grace: secs_var("FINDASH_SHUTDOWN_GRACE_SECS", 30)?,
            alpha_vantage_api_key,
            watchlist,
            subreddits,
            jobs_file,
        })
    }

    /// The static job table, from `FINDASH_JOBS_FILE` or the built-in
    /// defaults, with the environment overrides applied.
    pub fn pipeline_config(&self) -> anyhow::Result<PipelineConfig> {
        let mut pipeline = match &self.jobs_file {
            Some(path) => PipelineConfig::from_json_file(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(workers) = self.workers {
            pipeline.workers = workers;
        }
        for job in &mut pipeline.jobs {
            match job.collector_id.as_str() {
                sentiment::COLLECTOR_ID => {
                    if self.jobs_file.is_none() {
                        job.targets = self.subreddits.clone();
                    }
                }
                retention::COLLECTOR_ID => {}
                _ if !self.watchlist.is_empty() => job.targets = self.watchlist.clone(),
                _ => {}
            }
        }
        if self.alpha_vantage_api_key.is_none() {
            tracing::warn!("FINDASH_ALPHA_VANTAGE_API_KEY is not set, fundamentals collection is disabled");
            pipeline
                .jobs
                .retain(|job| job.collector_id != fundamentals::COLLECTOR_ID);
        }
        pipeline.validate()?;
        Ok(pipeline)
    }
}

fn secs_var(name: &str, default: u64) -> anyhow::Result<Duration> {
    let secs = match std::env::var(name) {
        Ok(raw) => raw
            .parse::<u64>()
            .with_context(|| format!("Invalid {}", name))?,
        Err(_) => default,
    };
    anyhow::ensure!(secs > 0, "{} must be positive", name);
    Ok(Duration::from_secs(secs))
}

fn split_list(raw: &str, uppercase: bool) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| if uppercase { s.to_ascii_uppercase() } else { s.to_string() })
        .collect()
}

use std::sync::Arc;

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use findash_core::utils::SystemClock;
use findash_core::{Pipeline, Providers};
use findash_providers::{
    AlphaVantageProvider, FundamentalsSource, OpenInsiderProvider, PriceSource, RedditProvider,
    YahooProvider,
};
use findash_storage_sqlite::SqliteRecordStore;

use crate::config::Config;

pub struct AppState {
    pub pipeline: Pipeline,
    pub db_path: String,
}

pub fn init_tracing() {
    let log_format = std::env::var("FINDASH_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
    }
}

fn build_providers(config: &Config) -> anyhow::Result<Providers> {
    let yahoo = Arc::new(YahooProvider::new()?);
    let alpha_vantage = config
        .alpha_vantage_api_key
        .as_ref()
        .map(|key| Arc::new(AlphaVantageProvider::new(key.clone())));

    let mut prices: Vec<Arc<dyn PriceSource>> = vec![yahoo as Arc<dyn PriceSource>];
    if let Some(av) = &alpha_vantage {
        prices.push(av.clone());
    }
    // Without a key the fundamentals job is dropped from the table, so this
    // client is never called.
    let fundamentals: Arc<dyn FundamentalsSource> = match alpha_vantage {
        Some(av) => av,
        None => Arc::new(AlphaVantageProvider::new("")),
    };

    Ok(Providers {
        prices,
        fundamentals,
        insider: Arc::new(OpenInsiderProvider::new()),
        social: Arc::new(RedditProvider::new()),
    })
}

pub async fn build_state(config: &Config) -> anyhow::Result<Arc<AppState>> {
    let store = SqliteRecordStore::open(&config.db_path)?;
    tracing::info!("Database path in use: {}", config.db_path);

    let pipeline_config = config.pipeline_config()?;
    let pipeline = Pipeline::build(
        &pipeline_config,
        Arc::new(store),
        build_providers(config)?,
        Arc::new(SystemClock),
    )
    .await?;

    for job in pipeline.scheduler.snapshots() {
        tracing::info!(
            "Job '{}' ({}) next run at {}",
            job.collector_id,
            job.schedule,
            job.next_run_at
        );
    }

    Ok(Arc::new(AppState {
        pipeline,
        db_path: config.db_path.clone(),
    }))
}

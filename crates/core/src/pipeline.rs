//! Wires providers, budgets, store, cache and collectors into a scheduler
//! according to a [`PipelineConfig`].

use std::sync::Arc;

use log::info;

use findash_providers::{FundamentalsSource, InsiderSource, PriceSource, SocialSource};

use crate::cache::{CacheLayer, CachedRecordReader};
use crate::collectors::{
    fundamentals, insider, market_data, retention, sentiment, Collector, CollectorContext,
    FundamentalsCollector, InsiderTradesCollector, MarketDataCollector, RetentionCollector,
    SocialSentimentCollector,
};
use crate::config::PipelineConfig;
use crate::errors::{Error, Result};
use crate::rate_budget::RateBudgetManager;
use crate::records::VersionClock;
use crate::scheduler::Scheduler;
use crate::store::RecordStore;
use crate::targets::StaticTargets;
use crate::utils::Clock;

/// Provider clients per capability. Price sources are tried in order.
#[derive(Clone)]
pub struct Providers {
    pub prices: Vec<Arc<dyn PriceSource>>,
    pub fundamentals: Arc<dyn FundamentalsSource>,
    pub insider: Arc<dyn InsiderSource>,
    pub social: Arc<dyn SocialSource>,
}

pub struct Pipeline {
    pub scheduler: Arc<Scheduler>,
    pub budgets: Arc<RateBudgetManager>,
    pub cache: Arc<CacheLayer>,
    pub reader: Arc<CachedRecordReader>,
    pub store: Arc<dyn RecordStore>,
    pub versions: Arc<VersionClock>,
}

impl Pipeline {
    /// Builds every collector named in `config.jobs` and registers it with
    /// a new scheduler. Record versions continue after the highest one the
    /// store already holds. Must be called inside a tokio runtime.
    pub async fn build(
        config: &PipelineConfig,
        store: Arc<dyn RecordStore>,
        providers: Providers,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let floor = store.max_version().await?.unwrap_or(0);
        let versions = Arc::new(VersionClock::starting_after(floor));
        let budgets = Arc::new(RateBudgetManager::new(clock.clone()));
        let cache = Arc::new(CacheLayer::new(clock.clone()));
        let ctx = CollectorContext {
            store: store.clone(),
            cache: cache.clone(),
            budgets: budgets.clone(),
            versions: versions.clone(),
            clock: clock.clone(),
            settings: config.collector_settings(),
        };
        let scheduler = Arc::new(Scheduler::new(config.scheduler_settings(), clock));

        for job in &config.jobs {
            let collector: Arc<dyn Collector> = match job.collector_id.as_str() {
                market_data::COLLECTOR_ID => Arc::new(
                    MarketDataCollector::new(ctx.clone(), providers.prices.clone())
                        .with_lookback_days(u64::from(config.price_lookback_days)),
                ),
                fundamentals::COLLECTOR_ID => Arc::new(FundamentalsCollector::new(
                    ctx.clone(),
                    providers.fundamentals.clone(),
                )),
                insider::COLLECTOR_ID => Arc::new(InsiderTradesCollector::new(
                    ctx.clone(),
                    providers.insider.clone(),
                )),
                sentiment::COLLECTOR_ID => Arc::new(
                    SocialSentimentCollector::new(ctx.clone(), providers.social.clone())?
                        .with_post_limit(config.reddit_post_limit)
                        .with_comments(config.reddit_comment_posts, config.reddit_comment_limit),
                ),
                retention::COLLECTOR_ID => {
                    Arc::new(RetentionCollector::new(ctx.clone(), &config.retention_days))
                }
                other => return Err(Error::UnknownCollector(other.to_string())),
            };
            scheduler.register(
                collector,
                job.schedule,
                Arc::new(StaticTargets::new(job.targets.iter().cloned())),
            )?;
        }

        // Overrides apply after collectors declared their own limits.
        for (provider_id, limit) in &config.rate_limits {
            budgets.set_limit(provider_id, *limit);
        }

        let reader = Arc::new(CachedRecordReader::new(
            store.clone(),
            cache.clone(),
            config.ttl_policy(),
        ));
        info!("Pipeline ready with {} job(s)", config.jobs.len());

        Ok(Self {
            scheduler,
            budgets,
            cache,
            reader,
            store,
            versions,
        })
    }
}

//! Background loops around the collection scheduler.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::main_lib::AppState;

/// Rolls rate budget windows on a fixed period until `shutdown` fires.
pub fn start_budget_rollover(
    state: Arc<AppState>,
    period: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Rate budget rollover started ({:?} period)", period);
        state.pipeline.budgets.run_rollover(period, shutdown).await;
    })
}

/// Drops expired cache entries so the map does not grow without bound.
pub fn start_cache_purge(
    state: Arc<AppState>,
    period: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut purge_interval = tokio::time::interval(period);
        // First tick is immediate and the cache is empty then.
        purge_interval.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = purge_interval.tick() => {
                    let dropped = state.pipeline.cache.purge_expired();
                    if dropped > 0 {
                        debug!("Purged {} expired cache entries", dropped);
                    }
                }
            }
        }
    })
}

/// Ticks the scheduler until `shutdown` fires, then cancels in-flight runs
/// and waits up to `grace` for them.
pub async fn run_scheduler(
    state: Arc<AppState>,
    tick: Duration,
    grace: Duration,
    shutdown: CancellationToken,
) {
    info!("Collection scheduler started ({:?} tick)", tick);
    let scheduler = state.pipeline.scheduler.clone();
    scheduler.run(tick, shutdown).await;
    scheduler.shutdown(grace).await;

    let stats = state.pipeline.cache.stats();
    info!(
        "Scheduler stopped; cache hit rate {:.1}% ({} hits, {} loads)",
        stats.hit_rate, stats.hits, stats.loads
    );
    for budget in state.pipeline.budgets.snapshots() {
        debug!(
            "Budget {}: {}/{} used since {}",
            budget.provider_id, budget.used, budget.limit, budget.window_start
        );
    }
}

mod config;
mod main_lib;
mod scheduler;

use tokio_util::sync::CancellationToken;

use config::Config;
use main_lib::{build_state, init_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing();
    let state = build_state(&config).await?;

    let shutdown = CancellationToken::new();
    let rollover =
        scheduler::start_budget_rollover(state.clone(), config.rollover_interval, shutdown.clone());
    let purge =
        scheduler::start_cache_purge(state.clone(), config.cache_purge_interval, shutdown.clone());
    let run = tokio::spawn(scheduler::run_scheduler(
        state.clone(),
        config.tick_interval,
        config.shutdown_grace,
        shutdown.clone(),
    ));

    tracing::info!("findash daemon running against {}", state.db_path);
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");
    shutdown.cancel();

    run.await?;
    rollover.await?;
    purge.await?;
    tracing::info!("findash daemon stopped");
    Ok(())
}

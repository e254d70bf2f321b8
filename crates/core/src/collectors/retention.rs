//! Retention sweep.
//!
//! Targets are entity type names (`stock_price`, `social_post`, ...). Each
//! target deletes the records of that type last collected longer ago than
//! its retention period, along with their old history rows. No provider is
//! called, so no budget is spent.

use std::collections::BTreeMap;

use async_trait::async_trait;
use log::info;
use tokio_util::sync::CancellationToken;

use super::{
    CollectionReport, Collector, CollectorContext, FailureKind, TargetFailure, TargetOutcome,
    TargetStatus,
};
use crate::records::EntityType;

pub const COLLECTOR_ID: &str = "retention";

/// Days kept per entity type when nothing else is configured.
pub const DEFAULT_RETENTION_DAYS: &[(EntityType, u32)] = &[
    (EntityType::StockPrice, 90),
    (EntityType::SocialPost, 7),
    (EntityType::SocialComment, 7),
];

pub struct RetentionCollector {
    ctx: CollectorContext,
    periods: BTreeMap<EntityType, chrono::Duration>,
}

impl RetentionCollector {
    pub fn new(ctx: CollectorContext, retention_days: &BTreeMap<EntityType, u32>) -> Self {
        let periods = retention_days
            .iter()
            .map(|(t, days)| (*t, chrono::Duration::days(i64::from(*days))))
            .collect();
        Self { ctx, periods }
    }

    async fn prune_target(&self, target: String) -> TargetOutcome {
        let rejected =
            |message: String| TargetStatus::Failed(TargetFailure::new(FailureKind::Rejected, message));

        let status = match target.trim().parse::<EntityType>() {
            Err(e) => rejected(e.to_string()),
            Ok(entity_type) => match self.periods.get(&entity_type) {
                None => rejected(format!("no retention period for {}", entity_type)),
                Some(period) => {
                    let cutoff = self.ctx.clock.now() - *period;
                    match self.ctx.store.prune(entity_type, cutoff).await {
                        Ok(pruned) => {
                            info!(
                                "[{}] removed {} {} record(s) and {} history row(s) older than {}",
                                COLLECTOR_ID, pruned.records, entity_type, pruned.history, cutoff
                            );
                            TargetStatus::Succeeded {
                                written: 0,
                                refreshed: 0,
                                stale: 0,
                            }
                        }
                        Err(e) => TargetStatus::Failed(TargetFailure::from_error(&e)),
                    }
                }
            },
        };

        TargetOutcome {
            target,
            provider: None,
            status,
        }
    }
}

#[async_trait]
impl Collector for RetentionCollector {
    fn id(&self) -> &str {
        COLLECTOR_ID
    }

    async fn collect(&self, targets: &[String], cancel: &CancellationToken) -> CollectionReport {
        self.ctx
            .run_targets(COLLECTOR_ID, targets, cancel, |t| self.prune_target(t))
            .await
    }
}

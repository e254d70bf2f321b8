//! Domain collectors and the per-target outcome model they report with.

mod context;
mod outcome;
mod traits;

pub mod fundamentals;
pub mod insider;
pub mod market_data;
pub mod retention;
pub mod sentiment;

pub use context::{CollectorContext, CollectorSettings};
pub use fundamentals::FundamentalsCollector;
pub use insider::InsiderTradesCollector;
pub use market_data::MarketDataCollector;
pub use outcome::{
    CollectionReport, FailureKind, FailurePolicy, RunVerdict, TargetFailure, TargetOutcome,
    TargetStatus,
};
pub use retention::RetentionCollector;
pub use sentiment::SocialSentimentCollector;
pub use traits::Collector;

use crate::records::EntityType;

/// Collector that writes records of `entity_type`.
pub fn owner_of(entity_type: EntityType) -> &'static str {
    match entity_type {
        EntityType::StockPrice => market_data::COLLECTOR_ID,
        EntityType::Fundamentals => fundamentals::COLLECTOR_ID,
        EntityType::InsiderTrade => insider::COLLECTOR_ID,
        EntityType::SocialPost | EntityType::SocialComment | EntityType::SocialSentiment => {
            sentiment::COLLECTOR_ID
        }
    }
}

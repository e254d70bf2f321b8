use std::collections::HashMap;
use std::time::Duration;

use crate::records::EntityType;

/// Time-to-live per entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtlPolicy {
    default: Duration,
    per_type: HashMap<EntityType, Duration>,
}

impl TtlPolicy {
    pub fn uniform(ttl: Duration) -> Self {
        Self {
            default: ttl,
            per_type: HashMap::new(),
        }
    }

    pub fn with(mut self, entity_type: EntityType, ttl: Duration) -> Self {
        self.per_type.insert(entity_type, ttl);
        self
    }

    pub fn ttl_for(&self, entity_type: EntityType) -> Duration {
        self.per_type
            .get(&entity_type)
            .copied()
            .unwrap_or(self.default)
    }
}

impl Default for TtlPolicy {
    /// Five minutes for prices, a day for fundamentals, an hour for filings,
    /// fifteen minutes for social data.
    fn default() -> Self {
        Self::uniform(Duration::from_secs(300))
            .with(EntityType::StockPrice, Duration::from_secs(300))
            .with(EntityType::Fundamentals, Duration::from_secs(24 * 3600))
            .with(EntityType::InsiderTrade, Duration::from_secs(3600))
            .with(EntityType::SocialPost, Duration::from_secs(900))
            .with(EntityType::SocialComment, Duration::from_secs(900))
            .with(EntityType::SocialSentiment, Duration::from_secs(900))
    }
}

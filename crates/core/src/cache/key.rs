//! Deterministic cache keys.
//!
//! Format: `v1:{entity_type}:{view}:{entity_key}`. The entity key goes last
//! because it may itself contain `:`. Bump the prefix if the payload shape
//! of any view changes, so old entries are never read as new ones.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::records::{CanonicalRecord, EntityType};

const KEY_PREFIX: &str = "v1";

/// Which projection of an entity a cache entry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheView {
    /// The single record for `(entity_type, entity_key)`.
    Detail,
    /// Latest records of one type for a ticker; the key part is the ticker.
    TickerFeed,
}

impl CacheView {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheView::Detail => "detail",
            CacheView::TickerFeed => "ticker_feed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(entity_type: EntityType, view: CacheView, entity_key: &str) -> Self {
        Self(format!(
            "{}:{}:{}:{}",
            KEY_PREFIX,
            entity_type.as_str(),
            view.as_str(),
            entity_key
        ))
    }

    pub fn detail(entity_type: EntityType, entity_key: &str) -> Self {
        Self::new(entity_type, CacheView::Detail, entity_key)
    }

    pub fn ticker_feed(entity_type: EntityType, ticker: &str) -> Self {
        Self::new(entity_type, CacheView::TickerFeed, ticker)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Every key whose cached value can change when `record` is written.
pub fn keys_for_record(record: &CanonicalRecord) -> Vec<CacheKey> {
    let mut keys = vec![CacheKey::detail(record.entity_type, &record.entity_key)];
    if let Some(ticker) = record.ticker.as_deref() {
        keys.push(CacheKey::ticker_feed(record.entity_type, ticker));
    }
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{Fundamentals, RecordPayload};
    use chrono::Utc;

    #[test]
    fn test_key_format_is_stable() {
        let key = CacheKey::detail(EntityType::StockPrice, "AAPL:2024-01-05");
        assert_eq!(key.as_str(), "v1:stock_price:detail:AAPL:2024-01-05");
        assert_eq!(
            CacheKey::ticker_feed(EntityType::InsiderTrade, "MSFT").to_string(),
            "v1:insider_trade:ticker_feed:MSFT"
        );
    }

    #[test]
    fn test_keys_for_record_cover_detail_and_feed() {
        let record = CanonicalRecord::new(
            RecordPayload::Fundamentals(Fundamentals {
                ticker: "IBM".to_string(),
                ..Fundamentals::default()
            }),
            "ALPHA_VANTAGE",
            Utc::now(),
            1,
        );
        let keys = keys_for_record(&record);
        assert_eq!(
            keys,
            vec![
                CacheKey::detail(EntityType::Fundamentals, "IBM"),
                CacheKey::ticker_feed(EntityType::Fundamentals, "IBM"),
            ]
        );
    }
}

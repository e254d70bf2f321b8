//! Canonical record types written by collectors and read through the cache.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::Error;

/// Kind of entity a canonical record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    StockPrice,
    Fundamentals,
    InsiderTrade,
    SocialPost,
    SocialComment,
    SocialSentiment,
}

impl EntityType {
    pub const ALL: [EntityType; 6] = [
        EntityType::StockPrice,
        EntityType::Fundamentals,
        EntityType::InsiderTrade,
        EntityType::SocialPost,
        EntityType::SocialComment,
        EntityType::SocialSentiment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::StockPrice => "stock_price",
            EntityType::Fundamentals => "fundamentals",
            EntityType::InsiderTrade => "insider_trade",
            EntityType::SocialPost => "social_post",
            EntityType::SocialComment => "social_comment",
            EntityType::SocialSentiment => "social_sentiment",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::Config(format!("unknown entity type '{}'", s)))
    }
}

/// One trading day for one ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockPrice {
    pub ticker: String,
    pub date: NaiveDate,
    pub open: Option<Decimal>,
    pub high: Option<Decimal>,
    pub low: Option<Decimal>,
    pub close: Decimal,
    pub adj_close: Option<Decimal>,
    pub volume: Option<Decimal>,
    pub currency: Option<String>,
}

/// Company profile and valuation snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fundamentals {
    pub ticker: String,
    pub name: Option<String>,
    pub exchange: Option<String>,
    pub currency: Option<String>,
    pub country: Option<String>,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub market_cap: Option<Decimal>,
    pub ebitda: Option<Decimal>,
    pub pe_ratio: Option<Decimal>,
    pub peg_ratio: Option<Decimal>,
    pub eps: Option<Decimal>,
    pub book_value: Option<Decimal>,
    pub dividend_yield: Option<Decimal>,
    pub profit_margin: Option<Decimal>,
    pub operating_margin: Option<Decimal>,
    pub return_on_assets: Option<Decimal>,
    pub return_on_equity: Option<Decimal>,
    pub revenue_ttm: Option<Decimal>,
    pub analyst_target_price: Option<Decimal>,
    pub week_52_high: Option<Decimal>,
    pub week_52_low: Option<Decimal>,
    pub moving_average_50: Option<Decimal>,
    pub moving_average_200: Option<Decimal>,
}

/// A single Form 4 transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsiderTrade {
    pub ticker: String,
    pub company_name: Option<String>,
    pub insider_name: String,
    pub title: Option<String>,
    /// SEC transaction code, e.g. `P` (purchase) or `S` (sale).
    pub trade_code: String,
    pub trade_description: Option<String>,
    pub filed_at: NaiveDateTime,
    pub trade_date: Option<NaiveDate>,
    pub price: Option<Decimal>,
    pub quantity: Option<i64>,
    pub shares_owned: Option<i64>,
    pub ownership_change: Option<String>,
    pub value: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

impl SentimentLabel {
    /// Labels a compound score in `[-1, 1]`.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.05 {
            SentimentLabel::Positive
        } else if score <= -0.05 {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        }
    }
}

/// A social media post that mentions at least one ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialPost {
    pub platform: String,
    pub post_id: String,
    pub community: String,
    pub title: String,
    pub author: Option<String>,
    pub score: i64,
    pub comment_count: i64,
    pub posted_at: DateTime<Utc>,
    pub permalink: Option<String>,
    pub tickers: Vec<String>,
    pub sentiment_score: f64,
    pub sentiment_label: SentimentLabel,
}

/// A comment under a collected post that mentions at least one ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialComment {
    pub platform: String,
    pub comment_id: String,
    pub post_id: String,
    pub community: String,
    pub author: Option<String>,
    pub body: String,
    pub score: i64,
    pub posted_at: DateTime<Utc>,
    pub tickers: Vec<String>,
    pub sentiment_score: f64,
    pub sentiment_label: SentimentLabel,
}

/// Daily per-ticker aggregate of social mentions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialSentiment {
    pub ticker: String,
    pub date: NaiveDate,
    pub platform: String,
    pub mention_count: u32,
    pub average_score: f64,
    pub positive_count: u32,
    pub negative_count: u32,
    pub neutral_count: u32,
    pub total_engagement: i64,
    pub label: SentimentLabel,
}

/// Typed domain payload of a canonical record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum RecordPayload {
    StockPrice(StockPrice),
    Fundamentals(Fundamentals),
    InsiderTrade(InsiderTrade),
    SocialPost(SocialPost),
    SocialComment(SocialComment),
    SocialSentiment(SocialSentiment),
}

impl RecordPayload {
    pub fn entity_type(&self) -> EntityType {
        match self {
            RecordPayload::StockPrice(_) => EntityType::StockPrice,
            RecordPayload::Fundamentals(_) => EntityType::Fundamentals,
            RecordPayload::InsiderTrade(_) => EntityType::InsiderTrade,
            RecordPayload::SocialPost(_) => EntityType::SocialPost,
            RecordPayload::SocialComment(_) => EntityType::SocialComment,
            RecordPayload::SocialSentiment(_) => EntityType::SocialSentiment,
        }
    }

    /// Stable identity of the entity within its type.
    pub fn entity_key(&self) -> String {
        match self {
            RecordPayload::StockPrice(p) => format!("{}:{}", p.ticker, p.date),
            RecordPayload::Fundamentals(f) => f.ticker.clone(),
            RecordPayload::InsiderTrade(t) => format!(
                "{}:{}:{}:{}:{}",
                t.ticker,
                t.filed_at.format("%Y%m%dT%H%M%S"),
                t.insider_name.to_ascii_lowercase().replace(' ', "-"),
                t.trade_code,
                t.quantity.unwrap_or_default()
            ),
            RecordPayload::SocialPost(p) => format!("{}:{}", p.platform, p.post_id),
            RecordPayload::SocialComment(c) => format!("{}:{}", c.platform, c.comment_id),
            RecordPayload::SocialSentiment(s) => format!("{}:{}:{}", s.ticker, s.date, s.platform),
        }
    }

    /// Ticker the entity belongs to, when it belongs to exactly one.
    pub fn ticker(&self) -> Option<&str> {
        match self {
            RecordPayload::StockPrice(p) => Some(&p.ticker),
            RecordPayload::Fundamentals(f) => Some(&f.ticker),
            RecordPayload::InsiderTrade(t) => Some(&t.ticker),
            RecordPayload::SocialPost(_) | RecordPayload::SocialComment(_) => None,
            RecordPayload::SocialSentiment(s) => Some(&s.ticker),
        }
    }
}

/// Normalized, provider-independent record keyed by `(entity_type, entity_key)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalRecord {
    pub entity_type: EntityType,
    pub entity_key: String,
    pub ticker: Option<String>,
    pub payload: RecordPayload,
    pub source: String,
    pub collected_at: DateTime<Utc>,
    pub version: i64,
}

impl CanonicalRecord {
    pub fn new(
        payload: RecordPayload,
        source: impl Into<String>,
        collected_at: DateTime<Utc>,
        version: i64,
    ) -> Self {
        Self {
            entity_type: payload.entity_type(),
            entity_key: payload.entity_key(),
            ticker: payload.ticker().map(str::to_string),
            payload,
            source: source.into(),
            collected_at,
            version,
        }
    }

    /// True when the domain content matches, ignoring `collected_at` and `version`.
    pub fn same_content(&self, other: &CanonicalRecord) -> bool {
        self.payload == other.payload && self.source == other.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn price() -> StockPrice {
        StockPrice {
            ticker: "AAPL".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            open: Some(dec!(181.99)),
            high: Some(dec!(182.76)),
            low: Some(dec!(180.17)),
            close: dec!(181.18),
            adj_close: None,
            volume: Some(dec!(62303300)),
            currency: None,
        }
    }

    #[test]
    fn test_entity_type_round_trips_through_str() {
        for t in EntityType::ALL {
            assert_eq!(t.as_str().parse::<EntityType>().unwrap(), t);
        }
        assert!("quote".parse::<EntityType>().is_err());
    }

    #[test]
    fn test_record_derives_identity_from_payload() {
        let at = Utc.with_ymd_and_hms(2024, 1, 5, 21, 0, 0).unwrap();
        let record = CanonicalRecord::new(RecordPayload::StockPrice(price()), "YAHOO", at, 7);
        assert_eq!(record.entity_type, EntityType::StockPrice);
        assert_eq!(record.entity_key, "AAPL:2024-01-05");
        assert_eq!(record.ticker.as_deref(), Some("AAPL"));
    }

    #[test]
    fn test_same_content_ignores_version_and_time() {
        let at = Utc.with_ymd_and_hms(2024, 1, 5, 21, 0, 0).unwrap();
        let a = CanonicalRecord::new(RecordPayload::StockPrice(price()), "YAHOO", at, 1);
        let mut b = a.clone();
        b.version = 2;
        b.collected_at = at + chrono::Duration::minutes(15);
        assert!(a.same_content(&b));

        if let RecordPayload::StockPrice(ref mut p) = b.payload {
            p.close = dec!(181.20);
        }
        assert!(!a.same_content(&b));
    }

    #[test]
    fn test_sentiment_label_thresholds() {
        assert_eq!(SentimentLabel::from_score(0.05), SentimentLabel::Positive);
        assert_eq!(SentimentLabel::from_score(0.049), SentimentLabel::Neutral);
        assert_eq!(SentimentLabel::from_score(-0.05), SentimentLabel::Negative);
    }

    #[test]
    fn test_insider_key_is_stable() {
        let trade = InsiderTrade {
            ticker: "AAPL".to_string(),
            company_name: Some("Apple Inc.".to_string()),
            insider_name: "Cook Timothy D".to_string(),
            title: Some("CEO".to_string()),
            trade_code: "S".to_string(),
            trade_description: Some("Sale".to_string()),
            filed_at: NaiveDate::from_ymd_opt(2024, 1, 5)
                .unwrap()
                .and_hms_opt(16, 30, 12)
                .unwrap(),
            trade_date: NaiveDate::from_ymd_opt(2024, 1, 3),
            price: Some(dec!(185.50)),
            quantity: Some(-5000),
            shares_owned: Some(3_280_000),
            ownership_change: Some("-2%".to_string()),
            value: Some(dec!(-927500)),
        };
        assert_eq!(
            RecordPayload::InsiderTrade(trade).entity_key(),
            "AAPL:20240105T163012:cook-timothy-d:S:-5000"
        );
    }
}

//! Provider client trait definitions.
//!
//! Every client implements [`ProviderClient`] plus the capability trait for
//! the kind of data it serves. Collectors hold capability trait objects, so a
//! test can swap any upstream for an in-memory fake.

use async_trait::async_trait;

use crate::errors::ProviderError;
use crate::models::{
    CompanyOverview, InsiderRow, PriceRequest, RateLimit, RawPrices, RedditComment, RedditPost,
};

/// Base contract shared by all provider clients.
pub trait ProviderClient: Send + Sync {
    /// Unique identifier, e.g. "YAHOO" or "ALPHA_VANTAGE".
    ///
    /// Budgets are keyed by this id, so two clients talking to the same
    /// upstream must return the same value.
    fn id(&self) -> &'static str;

    /// Request budget the upstream enforces.
    fn rate_limit(&self) -> RateLimit;
}

/// Daily price bars.
#[async_trait]
pub trait PriceSource: ProviderClient {
    async fn fetch_prices(&self, request: &PriceRequest) -> Result<RawPrices, ProviderError>;
}

/// Company overview and valuation ratios.
#[async_trait]
pub trait FundamentalsSource: ProviderClient {
    async fn fetch_overview(&self, symbol: &str) -> Result<CompanyOverview, ProviderError>;
}

/// Insider transaction filings for one ticker.
#[async_trait]
pub trait InsiderSource: ProviderClient {
    async fn fetch_filings(&self, symbol: &str) -> Result<Vec<InsiderRow>, ProviderError>;
}

/// Posts from a social feed (one subreddit per call) and their comments.
#[async_trait]
pub trait SocialSource: ProviderClient {
    async fn fetch_posts(&self, feed: &str, limit: u32) -> Result<Vec<RedditPost>, ProviderError>;

    /// Top-level comments of one post, best first.
    async fn fetch_comments(
        &self,
        post_id: &str,
        limit: u32,
    ) -> Result<Vec<RedditComment>, ProviderError>;
}

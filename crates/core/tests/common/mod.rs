#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::Semaphore;

use findash_core::cache::CacheLayer;
use findash_core::collectors::{CollectorContext, CollectorSettings};
use findash_core::rate_budget::RateBudgetManager;
use findash_core::records::VersionClock;
use findash_core::store::InMemoryRecordStore;
use findash_core::utils::ManualClock;
use findash_providers::{
    CompanyOverview, FundamentalsSource, InsiderRow, InsiderSource, PriceRequest, PriceSource,
    ProviderClient, ProviderError, RateLimit, RawPrices, RedditComment, RedditPost, SocialSource,
    YahooBar,
};

pub fn noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 5, 12, 0, 0).unwrap()
}

pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub store: Arc<InMemoryRecordStore>,
    pub cache: Arc<CacheLayer>,
    pub budgets: Arc<RateBudgetManager>,
    pub ctx: CollectorContext,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(CollectorSettings::default())
    }

    pub fn with_settings(settings: CollectorSettings) -> Self {
        Self::at(noon(), settings)
    }

    pub fn at(now: DateTime<Utc>, settings: CollectorSettings) -> Self {
        let clock = Arc::new(ManualClock::new(now));
        let store = Arc::new(InMemoryRecordStore::new());
        let cache = Arc::new(CacheLayer::new(clock.clone()));
        let budgets = Arc::new(RateBudgetManager::new(clock.clone()));
        let ctx = CollectorContext {
            store: store.clone(),
            cache: cache.clone(),
            budgets: budgets.clone(),
            versions: Arc::new(VersionClock::new()),
            clock: clock.clone(),
            settings,
        };
        Self {
            clock,
            store,
            cache,
            budgets,
            ctx,
        }
    }
}

pub fn symbols(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("SYM{}", i)).collect()
}

// =========================================================================
// Mock price source
// =========================================================================

pub struct MockPrices {
    id: &'static str,
    limit: RateLimit,
    close: Mutex<f64>,
    failures: Mutex<HashMap<String, ProviderError>>,
    gate: Option<Arc<Semaphore>>,
    calls: AtomicUsize,
}

impl MockPrices {
    pub fn new(id: &'static str) -> Self {
        Self {
            id,
            limit: RateLimit::per_hour(10_000),
            close: Mutex::new(100.0),
            failures: Mutex::new(HashMap::new()),
            gate: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_limit(mut self, limit: RateLimit) -> Self {
        self.limit = limit;
        self
    }

    /// Every call waits for a permit on `gate` before answering.
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn fail(self, symbol: &str, err: ProviderError) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(symbol.to_string(), err);
        self
    }

    pub fn set_close(&self, close: f64) {
        *self.close.lock().unwrap() = close;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ProviderClient for MockPrices {
    fn id(&self) -> &'static str {
        self.id
    }

    fn rate_limit(&self) -> RateLimit {
        self.limit
    }
}

#[async_trait]
impl PriceSource for MockPrices {
    async fn fetch_prices(&self, request: &PriceRequest) -> Result<RawPrices, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // Read before waiting so a later set_close does not leak into this call.
        let close = *self.close.lock().unwrap();
        if let Some(gate) = &self.gate {
            let _ = gate.acquire().await;
        }
        if let Some(err) = self.failures.lock().unwrap().get(&request.symbol) {
            return Err(err.clone());
        }
        let ts = request
            .end
            .and_hms_opt(14, 30, 0)
            .unwrap()
            .and_utc()
            .timestamp();
        Ok(RawPrices::Yahoo(vec![YahooBar {
            timestamp: ts,
            open: close,
            high: close,
            low: close,
            close,
            adjclose: close,
            volume: 1_000,
        }]))
    }
}

// =========================================================================
// Mock fundamentals source
// =========================================================================

pub struct MockOverview {
    limit: RateLimit,
    calls: AtomicUsize,
}

impl MockOverview {
    pub fn new(limit: RateLimit) -> Self {
        Self {
            limit,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ProviderClient for MockOverview {
    fn id(&self) -> &'static str {
        "ALPHA_VANTAGE"
    }

    fn rate_limit(&self) -> RateLimit {
        self.limit
    }
}

#[async_trait]
impl FundamentalsSource for MockOverview {
    async fn fetch_overview(&self, symbol: &str) -> Result<CompanyOverview, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(CompanyOverview {
            symbol: Some(symbol.to_string()),
            name: Some(format!("{} Inc", symbol)),
            pe_ratio: Some("21.5".to_string()),
            ..Default::default()
        })
    }
}

// =========================================================================
// Mock insider source
// =========================================================================

pub struct NoFilings;

impl ProviderClient for NoFilings {
    fn id(&self) -> &'static str {
        "OPENINSIDER"
    }

    fn rate_limit(&self) -> RateLimit {
        RateLimit::per_minute(60)
    }
}

#[async_trait]
impl InsiderSource for NoFilings {
    async fn fetch_filings(&self, _symbol: &str) -> Result<Vec<InsiderRow>, ProviderError> {
        Ok(Vec::new())
    }
}

// =========================================================================
// Mock social source
// =========================================================================

#[derive(Default)]
pub struct MockReddit {
    pub posts: HashMap<String, Vec<RedditPost>>,
    /// Keyed by post id; posts without an entry have no comments.
    pub comments: HashMap<String, Vec<RedditComment>>,
    pub comment_calls: AtomicUsize,
}

impl MockReddit {
    pub fn new(posts: HashMap<String, Vec<RedditPost>>) -> Self {
        Self {
            posts,
            ..Default::default()
        }
    }

    pub fn with_comments(mut self, post_id: &str, comments: Vec<RedditComment>) -> Self {
        self.comments.insert(post_id.to_string(), comments);
        self
    }

    pub fn comment_calls(&self) -> usize {
        self.comment_calls.load(Ordering::SeqCst)
    }
}

impl ProviderClient for MockReddit {
    fn id(&self) -> &'static str {
        "REDDIT"
    }

    fn rate_limit(&self) -> RateLimit {
        RateLimit::per_minute(60)
    }
}

#[async_trait]
impl SocialSource for MockReddit {
    async fn fetch_posts(&self, feed: &str, _limit: u32) -> Result<Vec<RedditPost>, ProviderError> {
        self.posts
            .get(feed)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound {
                provider: "REDDIT".to_string(),
                query: feed.to_string(),
            })
    }

    async fn fetch_comments(
        &self,
        post_id: &str,
        limit: u32,
    ) -> Result<Vec<RedditComment>, ProviderError> {
        self.comment_calls.fetch_add(1, Ordering::SeqCst);
        let mut comments = self.comments.get(post_id).cloned().unwrap_or_default();
        comments.truncate(limit as usize);
        Ok(comments)
    }
}

pub fn comment(id: &str, body: &str, created_utc: f64) -> RedditComment {
    RedditComment {
        id: id.to_string(),
        body: body.to_string(),
        score: 2,
        created_utc,
        ..Default::default()
    }
}

pub fn post(id: &str, subreddit: &str, title: &str, created_utc: f64) -> RedditPost {
    RedditPost {
        id: id.to_string(),
        subreddit: subreddit.to_string(),
        title: title.to_string(),
        score: 5,
        num_comments: 1,
        created_utc,
        ..Default::default()
    }
}

pub async fn wait_until(mut check: impl FnMut() -> bool) {
    for _ in 0..400 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

//! Reddit public listing client (`/r/{subreddit}/hot.json`) and comment
//! threads (`/comments/{id}.json`).

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use std::time::Duration;
use urlencoding::encode;

use crate::errors::ProviderError;
use crate::models::{Listing, RateLimit, RedditComment, RedditPost, ThreadListing};
use crate::provider::{http_client, ProviderClient, SocialSource};

const BASE_URL: &str = "https://www.reddit.com";
pub const PROVIDER_ID: &str = "REDDIT";

/// Reddit listing client. Unauthenticated, so the upstream allows roughly
/// one request per second.
pub struct RedditProvider {
    client: Client,
    base_url: String,
}

impl RedditProvider {
    pub fn new() -> Self {
        Self::with_timeout(super::DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            client: http_client(timeout),
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn listing_url(&self, subreddit: &str, limit: u32) -> String {
        let name = subreddit.trim().trim_start_matches("r/");
        format!(
            "{}/r/{}/hot.json?limit={}&raw_json=1",
            self.base_url,
            encode(name),
            limit.clamp(1, 100)
        )
    }

    fn comments_url(&self, post_id: &str, limit: u32) -> String {
        format!(
            "{}/comments/{}.json?limit={}&depth=1&sort=top&raw_json=1",
            self.base_url,
            encode(post_id.trim()),
            limit.clamp(1, 100)
        )
    }

    async fn get_body(&self, url: &str, query: &str) -> Result<String, ProviderError> {
        debug!("Reddit request: {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(PROVIDER_ID, e))?;

        let status = response.status();
        // Private, banned and missing subreddits or posts answer with 403/404.
        if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::FORBIDDEN {
            return Err(ProviderError::NotFound {
                provider: PROVIDER_ID.to_string(),
                query: query.to_string(),
            });
        }
        if !status.is_success() {
            return Err(ProviderError::from_status(PROVIDER_ID, status));
        }

        response
            .text()
            .await
            .map_err(|e| ProviderError::from_reqwest(PROVIDER_ID, e))
    }
}

impl Default for RedditProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// Decodes a listing body, dropping pinned moderator posts.
pub fn parse_listing(body: &str) -> Result<Vec<RedditPost>, ProviderError> {
    let listing: Listing = serde_json::from_str(body).map_err(|e| ProviderError::Malformed {
        provider: PROVIDER_ID.to_string(),
        message: e.to_string(),
    })?;

    Ok(listing
        .data
        .children
        .into_iter()
        .map(|child| child.data)
        .filter(|post| !post.stickied)
        .collect())
}

/// Decodes a comment thread body: `[post listing, comment listing]`.
/// Keeps top-level comments, dropping stickied, removed and deleted ones.
pub fn parse_comments(body: &str) -> Result<Vec<RedditComment>, ProviderError> {
    let malformed = |message: String| ProviderError::Malformed {
        provider: PROVIDER_ID.to_string(),
        message,
    };
    let listings: Vec<ThreadListing> =
        serde_json::from_str(body).map_err(|e| malformed(e.to_string()))?;
    let Some(thread) = listings.into_iter().nth(1) else {
        return Err(malformed("comment thread without a comment listing".to_string()));
    };

    let mut comments = Vec::new();
    for child in thread.data.children {
        if child.kind != "t1" {
            continue;
        }
        let comment: RedditComment =
            serde_json::from_value(child.data).map_err(|e| malformed(e.to_string()))?;
        if comment.stickied || matches!(comment.body.as_str(), "" | "[removed]" | "[deleted]") {
            continue;
        }
        comments.push(comment);
    }
    Ok(comments)
}

impl ProviderClient for RedditProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn rate_limit(&self) -> RateLimit {
        RateLimit::per_minute(60)
    }
}

#[async_trait]
impl SocialSource for RedditProvider {
    async fn fetch_posts(&self, feed: &str, limit: u32) -> Result<Vec<RedditPost>, ProviderError> {
        let url = self.listing_url(feed, limit);
        let body = self.get_body(&url, feed).await?;
        parse_listing(&body)
    }

    async fn fetch_comments(
        &self,
        post_id: &str,
        limit: u32,
    ) -> Result<Vec<RedditComment>, ProviderError> {
        let url = self.comments_url(post_id, limit);
        let body = self.get_body(&url, post_id).await?;
        let mut comments = parse_comments(&body)?;
        comments.truncate(limit as usize);
        Ok(comments)
    }
}

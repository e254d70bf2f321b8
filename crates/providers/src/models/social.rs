//! Raw Reddit listing payloads.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Listing {
    pub data: ListingData,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ListingData {
    #[serde(default)]
    pub children: Vec<ListingChild>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ListingChild {
    pub data: RedditPost,
}

/// One listing of a comment thread response. Children mix comments (`t1`)
/// with "load more" stubs, so their data stays untyped until filtered.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ThreadListing {
    pub data: ThreadListingData,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ThreadListingData {
    #[serde(default)]
    pub children: Vec<ThreadChild>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ThreadChild {
    pub kind: String,
    pub data: serde_json::Value,
}

/// A top-level comment on a post.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RedditComment {
    pub id: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub created_utc: f64,
    #[serde(default)]
    pub stickied: bool,
}

/// A post from a subreddit listing, restricted to the fields we keep.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RedditPost {
    pub id: String,
    #[serde(default)]
    pub subreddit: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub selftext: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub upvote_ratio: Option<f64>,
    #[serde(default)]
    pub num_comments: i64,
    /// Unix seconds, sent by Reddit as a float.
    #[serde(default)]
    pub created_utc: f64,
    #[serde(default)]
    pub permalink: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub stickied: bool,
}

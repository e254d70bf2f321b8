//! Social sentiment collector.
//!
//! Targets are subreddit names. Each run stores one `SocialPost` per post
//! that mentions a ticker and one `SocialComment` per ticker-mentioning
//! comment under the top posts, then writes a daily `SocialSentiment`
//! aggregate per ticker built from everything seen in that run.

mod lexicon;
mod tickers;

pub use lexicon::SentimentAnalyzer;
pub use tickers::TickerExtractor;

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use log::{debug, warn};
use tokio_util::sync::CancellationToken;

use findash_providers::{RedditComment, RedditPost, SocialSource};

use super::context::{blank_target, FetchError};
use super::{CollectionReport, Collector, CollectorContext, TargetOutcome, TargetStatus};
use crate::errors::Result;
use crate::records::{
    CanonicalRecord, RecordPayload, SentimentLabel, SocialComment, SocialPost, SocialSentiment,
};

pub const COLLECTOR_ID: &str = "social_sentiment";
pub const PLATFORM: &str = "reddit";

/// Posts requested per subreddit listing.
pub const DEFAULT_POST_LIMIT: u32 = 100;
/// Highest-scored ticker posts per subreddit whose comments are read.
pub const DEFAULT_COMMENT_POSTS: usize = 5;
/// Comments requested per post.
pub const DEFAULT_COMMENT_LIMIT: u32 = 50;

const MAX_COMMENT_CHARS: usize = 10_000;

const WSB_DAMPENING: f64 = 0.8;

pub struct SocialSentimentCollector {
    ctx: CollectorContext,
    source: Arc<dyn SocialSource>,
    post_limit: u32,
    comment_posts: usize,
    comment_limit: u32,
    extractor: TickerExtractor,
    analyzer: SentimentAnalyzer,
}

/// Everything a run saw, for the aggregate.
#[derive(Default)]
struct Mentions {
    posts: Vec<SocialPost>,
    comments: Vec<SocialComment>,
}

impl SocialSentimentCollector {
    pub fn new(ctx: CollectorContext, source: Arc<dyn SocialSource>) -> Result<Self> {
        ctx.register_provider(source.as_ref());
        Ok(Self {
            ctx,
            source,
            post_limit: DEFAULT_POST_LIMIT,
            comment_posts: DEFAULT_COMMENT_POSTS,
            comment_limit: DEFAULT_COMMENT_LIMIT,
            extractor: TickerExtractor::new()?,
            analyzer: SentimentAnalyzer::new()?,
        })
    }

    pub fn with_post_limit(mut self, limit: u32) -> Self {
        self.post_limit = limit.clamp(1, 100);
        self
    }

    /// Read up to `limit` comments under each of the `posts` best-scored
    /// posts per subreddit. Zero posts turns comment collection off.
    pub fn with_comments(mut self, posts: usize, limit: u32) -> Self {
        self.comment_posts = posts;
        self.comment_limit = limit.clamp(1, 100);
        self
    }

    /// Comments under the best-scored posts. A provider error skips that
    /// post; budget exhaustion or cancellation stops the sweep.
    async fn collect_comments(
        &self,
        posts: &[SocialPost],
        cancel: &CancellationToken,
    ) -> Vec<SocialComment> {
        let mut ranked: Vec<&SocialPost> = posts.iter().collect();
        ranked.sort_by(|a, b| b.score.cmp(&a.score));

        let provider_id = self.source.id();
        let mut comments = Vec::new();
        for post in ranked.into_iter().take(self.comment_posts) {
            let fetched = self
                .ctx
                .fetch(
                    provider_id,
                    cancel,
                    self.source.fetch_comments(&post.post_id, self.comment_limit),
                )
                .await;
            match fetched {
                Ok(raw) => comments.extend(normalize_reddit_comments(
                    &raw,
                    post,
                    &self.extractor,
                    &self.analyzer,
                )),
                Err(FetchError::Provider(e)) => {
                    debug!("Skipping comments of {}: {}", post.post_id, e);
                }
                Err(_) => break,
            }
        }
        comments
    }

    async fn collect_target(
        &self,
        target: String,
        cancel: &CancellationToken,
        seen: &Mutex<Mentions>,
    ) -> TargetOutcome {
        let community = target.trim().trim_start_matches("r/").to_string();
        if community.is_empty() {
            return blank_target(target);
        }
        let provider_id = self.source.id();
        let version = self.ctx.next_version();

        let status = match self
            .ctx
            .fetch(
                provider_id,
                cancel,
                self.source.fetch_posts(&community, self.post_limit),
            )
            .await
        {
            Ok(raw) => {
                let posts = normalize_reddit_posts(&raw, &self.extractor, &self.analyzer);
                debug!(
                    "r/{}: {} of {} posts mention tickers",
                    community,
                    posts.len(),
                    raw.len()
                );
                let comments = if self.comment_posts > 0 {
                    self.collect_comments(&posts, cancel).await
                } else {
                    Vec::new()
                };
                let now = self.ctx.clock.now();
                let records: Vec<CanonicalRecord> = posts
                    .iter()
                    .map(|p| RecordPayload::SocialPost(p.clone()))
                    .chain(comments.iter().map(|c| RecordPayload::SocialComment(c.clone())))
                    .map(|payload| CanonicalRecord::new(payload, provider_id, now, version))
                    .collect();
                let status = self.ctx.write_records(&records).await;
                if !status.is_failed() {
                    let mut guard = seen.lock().unwrap_or_else(|poisoned| {
                        warn!("Mention buffer lock poisoned, recovering");
                        poisoned.into_inner()
                    });
                    guard.posts.extend(posts);
                    guard.comments.extend(comments);
                }
                status
            }
            Err(err) => err.into_status(),
        };

        TargetOutcome {
            target: community,
            provider: Some(provider_id.to_string()),
            status,
        }
    }

    /// Writes the per-ticker aggregates of this run as one extra outcome.
    async fn write_aggregates(&self, seen: &Mentions, version: i64) -> Option<TargetOutcome> {
        let aggregates = aggregate_sentiment(&seen.posts, &seen.comments);
        if aggregates.is_empty() {
            return None;
        }
        let now = self.ctx.clock.now();
        let records: Vec<CanonicalRecord> = aggregates
            .into_iter()
            .map(|s| {
                CanonicalRecord::new(RecordPayload::SocialSentiment(s), self.source.id(), now, version)
            })
            .collect();
        let status = self.ctx.write_records(&records).await;
        if let TargetStatus::Failed(failure) = &status {
            warn!("[{}] aggregate write failed: {}", COLLECTOR_ID, failure.message);
        }
        Some(TargetOutcome {
            target: format!("{}:aggregate", COLLECTOR_ID),
            provider: None,
            status,
        })
    }
}

#[async_trait]
impl Collector for SocialSentimentCollector {
    fn id(&self) -> &str {
        COLLECTOR_ID
    }

    async fn collect(&self, targets: &[String], cancel: &CancellationToken) -> CollectionReport {
        let aggregate_version = self.ctx.next_version();
        let seen = Mutex::new(Mentions::default());

        let mut report = self
            .ctx
            .run_targets(COLLECTOR_ID, targets, cancel, |t| {
                self.collect_target(t, cancel, &seen)
            })
            .await;

        if report.cancelled {
            return report;
        }
        let seen = seen.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(outcome) = self.write_aggregates(&seen, aggregate_version).await {
            report.outcomes.push(outcome);
            report.finished_at = self.ctx.clock.now();
        }
        report
    }
}

/// Turns a raw listing into posts that mention at least one ticker.
/// Automated and meta posts are dropped, as are posts without a usable
/// timestamp.
pub fn normalize_reddit_posts(
    raw: &[RedditPost],
    extractor: &TickerExtractor,
    analyzer: &SentimentAnalyzer,
) -> Vec<SocialPost> {
    let mut ids = HashSet::new();
    let mut posts = Vec::new();

    for post in raw {
        if post.id.is_empty() || !ids.insert(post.id.as_str()) {
            continue;
        }
        let text = match post.selftext.as_deref() {
            Some(body) if !body.trim().is_empty() => format!("{}\n{}", post.title, body),
            _ => post.title.clone(),
        };
        if analyzer.is_noise(&post.title) || analyzer.is_noise(&text) {
            continue;
        }
        let tickers = extractor.extract(&text);
        if tickers.is_empty() {
            continue;
        }
        let Some(posted_at) = posted_at(post.created_utc) else {
            debug!("Skipping post {} with bad timestamp {}", post.id, post.created_utc);
            continue;
        };

        let mut score = analyzer.score(&text);
        if post.subreddit.eq_ignore_ascii_case("wallstreetbets") {
            score *= WSB_DAMPENING;
        }

        posts.push(SocialPost {
            platform: PLATFORM.to_string(),
            post_id: post.id.clone(),
            community: post.subreddit.clone(),
            title: post.title.clone(),
            author: post
                .author
                .clone()
                .filter(|a| !a.is_empty() && a != "[deleted]"),
            score: post.score,
            comment_count: post.num_comments,
            posted_at,
            permalink: post.permalink.clone(),
            tickers,
            sentiment_score: score,
            sentiment_label: SentimentLabel::from_score(score),
        });
    }
    posts
}

/// Turns the comments under `post` into ticker-mentioning comments.
pub fn normalize_reddit_comments(
    raw: &[RedditComment],
    post: &SocialPost,
    extractor: &TickerExtractor,
    analyzer: &SentimentAnalyzer,
) -> Vec<SocialComment> {
    let mut ids = HashSet::new();
    let mut comments = Vec::new();

    for comment in raw {
        if comment.id.is_empty() || !ids.insert(comment.id.as_str()) {
            continue;
        }
        let tickers = extractor.extract(&comment.body);
        if tickers.is_empty() {
            continue;
        }
        let Some(posted_at) = posted_at(comment.created_utc) else {
            continue;
        };

        let mut score = analyzer.score(&comment.body);
        if post.community.eq_ignore_ascii_case("wallstreetbets") {
            score *= WSB_DAMPENING;
        }

        comments.push(SocialComment {
            platform: post.platform.clone(),
            comment_id: comment.id.clone(),
            post_id: post.post_id.clone(),
            community: post.community.clone(),
            author: comment
                .author
                .clone()
                .filter(|a| !a.is_empty() && a != "[deleted]"),
            body: comment.body.chars().take(MAX_COMMENT_CHARS).collect(),
            score: comment.score,
            posted_at,
            tickers,
            sentiment_score: score,
            sentiment_label: SentimentLabel::from_score(score),
        });
    }
    comments
}

fn posted_at(created_utc: f64) -> Option<DateTime<Utc>> {
    if !created_utc.is_finite() || created_utc <= 0.0 {
        return None;
    }
    DateTime::from_timestamp(created_utc.trunc() as i64, 0)
}

#[derive(Default)]
struct Tally {
    mentions: u32,
    score_sum: f64,
    positive: u32,
    negative: u32,
    neutral: u32,
    engagement: i64,
}

impl Tally {
    fn add(&mut self, score: f64, label: SentimentLabel, engagement: i64) {
        self.mentions += 1;
        self.score_sum += score;
        self.engagement += engagement;
        match label {
            SentimentLabel::Positive => self.positive += 1,
            SentimentLabel::Negative => self.negative += 1,
            SentimentLabel::Neutral => self.neutral += 1,
        }
    }
}

/// Groups post and comment mentions by ticker and posting day.
pub fn aggregate_sentiment(
    posts: &[SocialPost],
    comments: &[SocialComment],
) -> Vec<SocialSentiment> {
    let mut tallies: BTreeMap<(String, NaiveDate, String), Tally> = BTreeMap::new();
    for post in posts {
        for ticker in &post.tickers {
            tallies
                .entry((ticker.clone(), post.posted_at.date_naive(), post.platform.clone()))
                .or_default()
                .add(post.sentiment_score, post.sentiment_label, post.score + post.comment_count);
        }
    }
    for comment in comments {
        for ticker in &comment.tickers {
            tallies
                .entry((ticker.clone(), comment.posted_at.date_naive(), comment.platform.clone()))
                .or_default()
                .add(comment.sentiment_score, comment.sentiment_label, comment.score);
        }
    }

    tallies
        .into_iter()
        .map(|((ticker, date, platform), t)| {
            let average = t.score_sum / f64::from(t.mentions.max(1));
            SocialSentiment {
                ticker,
                date,
                platform,
                mention_count: t.mentions,
                average_score: average,
                positive_count: t.positive,
                negative_count: t.negative,
                neutral_count: t.neutral,
                total_engagement: t.engagement,
                label: SentimentLabel::from_score(average),
            }
        })
        .collect()
}

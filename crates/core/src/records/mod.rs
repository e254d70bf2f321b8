//! Canonical records and their versioning.

mod model;
mod version;

pub use model::{
    CanonicalRecord, EntityType, Fundamentals, InsiderTrade, RecordPayload, SentimentLabel,
    SocialComment, SocialPost, SocialSentiment, StockPrice,
};
pub use version::VersionClock;

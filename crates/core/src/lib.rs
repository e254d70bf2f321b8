//! findash core - collection pipeline for market, fundamentals, insider and
//! social data.
//!
//! Collectors fetch from provider clients under shared per-provider rate
//! budgets and write versioned canonical records to a [`store::RecordStore`].
//! Reads go through the [`cache::CacheLayer`], which only ever loads from
//! the store. The [`scheduler::Scheduler`] runs collectors on a worker pool
//! with retry backoff. Storage backends live in separate crates.

pub mod cache;
pub mod collectors;
pub mod config;
pub mod errors;
pub mod pipeline;
pub mod rate_budget;
pub mod records;
pub mod scheduler;
pub mod status;
pub mod store;
pub mod targets;
pub mod utils;

pub use config::PipelineConfig;
pub use pipeline::{Pipeline, Providers};

pub use errors::Error;
pub use errors::Result;

//! Provider clients and the traits they implement.

pub mod alpha_vantage;
pub mod openinsider;
pub mod reddit;
mod traits;
pub mod yahoo;

pub use traits::{FundamentalsSource, InsiderSource, PriceSource, ProviderClient, SocialSource};

use std::time::Duration;

/// Timeout applied to every outbound provider request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// User agent sent to providers that reject anonymous clients.
pub const USER_AGENT: &str = concat!("findash/", env!("CARGO_PKG_VERSION"));

/// Builds the shared HTTP client configuration used by the clients.
pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .unwrap_or_else(|e| {
            log::warn!("Failed to build configured HTTP client, using defaults: {}", e);
            reqwest::Client::new()
        })
}

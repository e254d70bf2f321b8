//! Provider clients for the findash collection pipeline.
//!
//! Each client wraps one upstream API, declares the request budget the
//! upstream enforces and returns payloads in the upstream's own shape.
//! Normalization into canonical records happens in `findash-core`.
//!
//! # Providers
//!
//! | Id | Data | Declared limit |
//! |----|------|----------------|
//! | `YAHOO` | daily OHLCV | 2000 / hour |
//! | `ALPHA_VANTAGE` | latest quote, company overview | 25 / day |
//! | `OPENINSIDER` | insider filings (HTML) | 60 / minute |
//! | `REDDIT` | subreddit listings | 60 / minute |

pub mod errors;
pub mod models;
pub mod provider;

pub use errors::{ProviderError, RetryClass};
pub use models::{
    CompanyOverview, GlobalQuote, InsiderRow, PriceRequest, ProviderId, RateLimit, RawPrices,
    RedditComment, RedditPost, WindowKind, YahooBar,
};
pub use provider::alpha_vantage::AlphaVantageProvider;
pub use provider::openinsider::OpenInsiderProvider;
pub use provider::reddit::RedditProvider;
pub use provider::yahoo::YahooProvider;
pub use provider::{FundamentalsSource, InsiderSource, PriceSource, ProviderClient, SocialSource};

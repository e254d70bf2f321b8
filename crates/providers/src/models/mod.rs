//! Provider-facing data models.

mod fundamentals;
mod insider;
mod price;
mod social;
mod types;

pub use fundamentals::CompanyOverview;
pub use insider::InsiderRow;
pub use price::{GlobalQuote, PriceRequest, RawPrices, YahooBar};
pub(crate) use social::{Listing, ThreadListing};
pub use social::{RedditComment, RedditPost};
pub use types::{ProviderId, RateLimit, WindowKind};

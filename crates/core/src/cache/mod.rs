//! Freshness-bounded read-through cache over the record store.
//!
//! The cache never talks to providers. Collectors invalidate the keys
//! derived from every record they write; readers repopulate from the Store.

mod key;
mod layer;
mod reader;
mod ttl;

pub use key::{keys_for_record, CacheKey, CacheView};
pub use layer::{CacheEntry, CacheFill, CacheLayer, CacheStats};
pub use reader::{CachedRecordReader, DEFAULT_FEED_LIMIT};
pub use ttl::TtlPolicy;

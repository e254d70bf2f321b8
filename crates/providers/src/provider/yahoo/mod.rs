//! Yahoo Finance client for daily OHLCV history.

use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use log::{debug, warn};
use time::OffsetDateTime;
use yahoo_finance_api as yahoo;

use crate::errors::ProviderError;
use crate::models::{PriceRequest, RateLimit, RawPrices, YahooBar};
use crate::provider::{PriceSource, ProviderClient};

pub const PROVIDER_ID: &str = "YAHOO";

/// Yahoo Finance price provider.
pub struct YahooProvider {
    connector: yahoo::YahooConnector,
}

impl YahooProvider {
    pub fn new() -> Result<Self, ProviderError> {
        let connector = yahoo::YahooConnector::new().map_err(|e| ProviderError::Transport {
            provider: PROVIDER_ID.to_string(),
            message: format!("Failed to initialize Yahoo connector: {}", e),
        })?;
        Ok(Self { connector })
    }

    /// Midnight UTC of `date` as the `time` crate type the connector wants.
    fn date_to_offset_datetime(date: NaiveDate) -> OffsetDateTime {
        let ts = date
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp())
            .unwrap_or_default();
        OffsetDateTime::from_unix_timestamp(ts).unwrap_or_else(|_| OffsetDateTime::now_utc())
    }

    fn map_error(symbol: &str, err: yahoo::YahooError) -> ProviderError {
        if matches!(err, yahoo::YahooError::NoQuotes | yahoo::YahooError::NoResult) {
            return ProviderError::NotFound {
                provider: PROVIDER_ID.to_string(),
                query: symbol.to_string(),
            };
        }
        classify_message(&err.to_string())
    }
}

/// Classifies connector errors that only carry a message.
fn classify_message(message: &str) -> ProviderError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("429") || lower.contains("too many requests") {
        ProviderError::RateLimited {
            provider: PROVIDER_ID.to_string(),
        }
    } else if lower.contains("timed out") || lower.contains("timeout") {
        ProviderError::Timeout {
            provider: PROVIDER_ID.to_string(),
        }
    } else if lower.contains("deserializ") || lower.contains("invalid json") {
        ProviderError::Malformed {
            provider: PROVIDER_ID.to_string(),
            message: message.to_string(),
        }
    } else {
        ProviderError::Transport {
            provider: PROVIDER_ID.to_string(),
            message: message.to_string(),
        }
    }
}

impl ProviderClient for YahooProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn rate_limit(&self) -> RateLimit {
        RateLimit::per_hour(2000)
    }
}

#[async_trait]
impl PriceSource for YahooProvider {
    async fn fetch_prices(&self, request: &PriceRequest) -> Result<RawPrices, ProviderError> {
        debug!(
            "Fetching daily bars for {} from {} to {} from Yahoo",
            request.symbol, request.start, request.end
        );

        let start = Self::date_to_offset_datetime(request.start);
        // The chart API treats the end bound as exclusive.
        let end_date = request
            .end
            .checked_add_days(Days::new(1))
            .unwrap_or(request.end);
        let end = Self::date_to_offset_datetime(end_date);

        let response = self
            .connector
            .get_quote_history(&request.symbol, start, end)
            .await
            .map_err(|e| Self::map_error(&request.symbol, e))?;

        match response.quotes() {
            Ok(quotes) => Ok(RawPrices::Yahoo(
                quotes
                    .into_iter()
                    .map(|q| YahooBar {
                        timestamp: q.timestamp as i64,
                        open: q.open,
                        high: q.high,
                        low: q.low,
                        close: q.close,
                        adjclose: q.adjclose,
                        volume: q.volume,
                    })
                    .collect(),
            )),
            Err(yahoo::YahooError::NoQuotes) => {
                warn!(
                    "No daily bars returned for '{}' between {} and {}",
                    request.symbol, request.start, request.end
                );
                Ok(RawPrices::Yahoo(Vec::new()))
            }
            Err(e) => Err(Self::map_error(&request.symbol, e)),
        }
    }
}

//! Daily price collector with provider fallback.
//!
//! Sources are tried in order; a source that times out, errors with 5xx or
//! has no budget left hands the target to the next one.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate, TimeZone, Utc};
use log::{debug, warn};
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;

use findash_providers::{GlobalQuote, PriceRequest, PriceSource, RawPrices, YahooBar};

use super::context::{blank_target, normalize_symbol};
use super::{
    CollectionReport, Collector, CollectorContext, FailureKind, TargetFailure, TargetOutcome,
    TargetStatus,
};
use crate::errors::{Error, Result};
use crate::records::{CanonicalRecord, RecordPayload, StockPrice};
use crate::utils::parse::{non_empty, parse_decimal};

pub const COLLECTOR_ID: &str = "market_data";

const DEFAULT_LOOKBACK_DAYS: u64 = 5;

pub struct MarketDataCollector {
    ctx: CollectorContext,
    sources: Vec<Arc<dyn PriceSource>>,
    lookback_days: u64,
}

impl MarketDataCollector {
    /// `sources` in preference order.
    pub fn new(ctx: CollectorContext, sources: Vec<Arc<dyn PriceSource>>) -> Self {
        for source in &sources {
            ctx.register_provider(source.as_ref());
        }
        Self {
            ctx,
            sources,
            lookback_days: DEFAULT_LOOKBACK_DAYS,
        }
    }

    pub fn with_lookback_days(mut self, days: u64) -> Self {
        self.lookback_days = days.max(1);
        self
    }

    async fn collect_target(&self, target: String, cancel: &CancellationToken) -> TargetOutcome {
        let Some(symbol) = normalize_symbol(&target) else {
            return blank_target(target);
        };

        let today = self.ctx.clock.now().date_naive();
        let request = PriceRequest {
            symbol: symbol.clone(),
            start: today
                .checked_sub_days(Days::new(self.lookback_days))
                .unwrap_or(today),
            end: today,
        };

        let mut last: Option<(String, TargetStatus)> = None;
        for source in &self.sources {
            let provider_id = source.id();
            let version = self.ctx.next_version();

            match self
                .ctx
                .fetch(provider_id, cancel, source.fetch_prices(&request))
                .await
            {
                Ok(raw) => {
                    let collected_at = self.ctx.clock.now();
                    let status = match normalize_prices(&symbol, provider_id, raw, collected_at, version)
                    {
                        Ok(records) => self.ctx.write_records(&records).await,
                        Err(e) => TargetStatus::Failed(TargetFailure::from_error(&e)),
                    };
                    return TargetOutcome {
                        target: symbol,
                        provider: Some(provider_id.to_string()),
                        status,
                    };
                }
                Err(err) if err.allows_fallback() => {
                    debug!(
                        "{} unavailable for {}, trying next source: {:?}",
                        provider_id, symbol, err
                    );
                    last = Some((provider_id.to_string(), err.into_status()));
                }
                Err(err) => {
                    return TargetOutcome {
                        target: symbol,
                        provider: Some(provider_id.to_string()),
                        status: err.into_status(),
                    };
                }
            }
        }

        match last {
            Some((provider, status)) => TargetOutcome {
                target: symbol,
                provider: Some(provider),
                status,
            },
            None => TargetOutcome {
                target: symbol,
                provider: None,
                status: TargetStatus::Failed(TargetFailure::new(
                    FailureKind::Internal,
                    "no price sources configured",
                )),
            },
        }
    }
}

#[async_trait]
impl Collector for MarketDataCollector {
    fn id(&self) -> &str {
        COLLECTOR_ID
    }

    async fn collect(&self, targets: &[String], cancel: &CancellationToken) -> CollectionReport {
        self.ctx
            .run_targets(COLLECTOR_ID, targets, cancel, |t| self.collect_target(t, cancel))
            .await
    }
}

// ============================================================================
// Normalization
// ============================================================================

pub fn normalize_prices(
    symbol: &str,
    source: &str,
    raw: RawPrices,
    collected_at: DateTime<Utc>,
    version: i64,
) -> Result<Vec<CanonicalRecord>> {
    let prices = match raw {
        RawPrices::Yahoo(bars) => normalize_yahoo_bars(symbol, &bars)?,
        RawPrices::AlphaVantage(quote) => vec![normalize_alpha_vantage_quote(symbol, &quote)?],
    };
    Ok(prices
        .into_iter()
        .map(|p| CanonicalRecord::new(RecordPayload::StockPrice(p), source, collected_at, version))
        .collect())
}

fn finite_decimal(value: f64) -> Option<Decimal> {
    if value.is_finite() {
        Decimal::from_f64_retain(value).map(|d| d.round_dp(6).normalize())
    } else {
        None
    }
}

/// Yahoo daily bars. Bars without a usable close (the session still in
/// progress, halted days) are skipped; if every bar is unusable the payload
/// is rejected.
pub fn normalize_yahoo_bars(symbol: &str, bars: &[YahooBar]) -> Result<Vec<StockPrice>> {
    let mut by_date: BTreeMap<NaiveDate, StockPrice> = BTreeMap::new();
    for bar in bars {
        let Some(date) = Utc
            .timestamp_opt(bar.timestamp, 0)
            .single()
            .map(|dt| dt.date_naive())
        else {
            warn!("Skipping {} bar with bad timestamp {}", symbol, bar.timestamp);
            continue;
        };
        let Some(close) = finite_decimal(bar.close).filter(|c| *c > Decimal::ZERO) else {
            warn!("Skipping {} bar for {} without close", symbol, date);
            continue;
        };
        by_date.insert(
            date,
            StockPrice {
                ticker: symbol.to_string(),
                date,
                open: finite_decimal(bar.open),
                high: finite_decimal(bar.high),
                low: finite_decimal(bar.low),
                close,
                adj_close: finite_decimal(bar.adjclose),
                volume: Some(Decimal::from(bar.volume)),
                currency: None,
            },
        );
    }

    if by_date.is_empty() && !bars.is_empty() {
        return Err(Error::Normalization(format!(
            "no usable Yahoo bars for {}",
            symbol
        )));
    }
    Ok(by_date.into_values().collect())
}

/// Alpha Vantage latest quote. Trading day and price are required.
pub fn normalize_alpha_vantage_quote(symbol: &str, quote: &GlobalQuote) -> Result<StockPrice> {
    let date_str = non_empty(quote.latest_trading_day.as_deref()).ok_or_else(|| {
        Error::Normalization(format!("Alpha Vantage quote for {} has no trading day", symbol))
    })?;
    let date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")?;
    let close = parse_decimal(quote.price.as_deref()).ok_or_else(|| {
        Error::Normalization(format!("Alpha Vantage quote for {} has no price", symbol))
    })?;

    Ok(StockPrice {
        ticker: symbol.to_string(),
        date,
        open: parse_decimal(quote.open.as_deref()),
        high: parse_decimal(quote.high.as_deref()),
        low: parse_decimal(quote.low.as_deref()),
        close,
        adj_close: None,
        volume: parse_decimal(quote.volume.as_deref()),
        currency: None,
    })
}

//! Company overview collector.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use findash_providers::{CompanyOverview, FundamentalsSource};

use super::context::{blank_target, normalize_symbol};
use super::{CollectionReport, Collector, CollectorContext, TargetFailure, TargetOutcome, TargetStatus};
use crate::errors::{Error, Result};
use crate::records::{CanonicalRecord, Fundamentals, RecordPayload};
use crate::utils::parse::{non_empty, parse_decimal};

pub const COLLECTOR_ID: &str = "fundamentals";

pub struct FundamentalsCollector {
    ctx: CollectorContext,
    source: Arc<dyn FundamentalsSource>,
}

impl FundamentalsCollector {
    pub fn new(ctx: CollectorContext, source: Arc<dyn FundamentalsSource>) -> Self {
        ctx.register_provider(source.as_ref());
        Self { ctx, source }
    }

    async fn collect_target(&self, target: String, cancel: &CancellationToken) -> TargetOutcome {
        let Some(symbol) = normalize_symbol(&target) else {
            return blank_target(target);
        };
        let provider_id = self.source.id();
        let version = self.ctx.next_version();

        let status = match self
            .ctx
            .fetch(provider_id, cancel, self.source.fetch_overview(&symbol))
            .await
        {
            Ok(overview) => {
                match normalize_overview(&symbol, &overview, provider_id, self.ctx.clock.now(), version)
                {
                    Ok(record) => self.ctx.write_records(&[record]).await,
                    Err(e) => TargetStatus::Failed(TargetFailure::from_error(&e)),
                }
            }
            Err(err) => err.into_status(),
        };

        TargetOutcome {
            target: symbol,
            provider: Some(provider_id.to_string()),
            status,
        }
    }
}

#[async_trait]
impl Collector for FundamentalsCollector {
    fn id(&self) -> &str {
        COLLECTOR_ID
    }

    async fn collect(&self, targets: &[String], cancel: &CancellationToken) -> CollectionReport {
        self.ctx
            .run_targets(COLLECTOR_ID, targets, cancel, |t| self.collect_target(t, cancel))
            .await
    }
}

/// Maps an Alpha Vantage overview onto [`Fundamentals`]. The response must
/// be for the requested symbol.
pub fn normalize_overview(
    symbol: &str,
    overview: &CompanyOverview,
    source: &str,
    collected_at: DateTime<Utc>,
    version: i64,
) -> Result<CanonicalRecord> {
    match overview.symbol.as_deref().map(str::trim) {
        Some(s) if s.eq_ignore_ascii_case(symbol) => {}
        other => {
            return Err(Error::Normalization(format!(
                "overview for {} came back as {:?}",
                symbol, other
            )))
        }
    }

    let dec = |v: &Option<String>| parse_decimal(v.as_deref());
    let text = |v: &Option<String>| non_empty(v.as_deref());

    let fundamentals = Fundamentals {
        ticker: symbol.to_string(),
        name: text(&overview.name),
        exchange: text(&overview.exchange),
        currency: text(&overview.currency),
        country: text(&overview.country),
        sector: text(&overview.sector),
        industry: text(&overview.industry),
        market_cap: dec(&overview.market_capitalization),
        ebitda: dec(&overview.ebitda),
        pe_ratio: dec(&overview.pe_ratio),
        peg_ratio: dec(&overview.peg_ratio),
        eps: dec(&overview.eps),
        book_value: dec(&overview.book_value),
        dividend_yield: dec(&overview.dividend_yield),
        profit_margin: dec(&overview.profit_margin),
        operating_margin: dec(&overview.operating_margin_ttm),
        return_on_assets: dec(&overview.return_on_assets_ttm),
        return_on_equity: dec(&overview.return_on_equity_ttm),
        revenue_ttm: dec(&overview.revenue_ttm),
        analyst_target_price: dec(&overview.analyst_target_price),
        week_52_high: dec(&overview.week_52_high),
        week_52_low: dec(&overview.week_52_low),
        moving_average_50: dec(&overview.day_50_moving_average),
        moving_average_200: dec(&overview.day_200_moving_average),
    };

    Ok(CanonicalRecord::new(
        RecordPayload::Fundamentals(fundamentals),
        source,
        collected_at,
        version,
    ))
}

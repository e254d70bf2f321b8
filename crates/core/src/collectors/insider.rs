//! Insider filing collector.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use log::debug;
use tokio_util::sync::CancellationToken;

use findash_providers::{InsiderRow, InsiderSource};

use super::context::{blank_target, normalize_symbol};
use super::{CollectionReport, Collector, CollectorContext, TargetFailure, TargetOutcome, TargetStatus};
use crate::errors::{Error, Result};
use crate::records::{CanonicalRecord, InsiderTrade, RecordPayload};
use crate::utils::parse::{non_empty, parse_decimal, parse_i64};

pub const COLLECTOR_ID: &str = "insider_trades";

pub struct InsiderTradesCollector {
    ctx: CollectorContext,
    source: Arc<dyn InsiderSource>,
}

impl InsiderTradesCollector {
    pub fn new(ctx: CollectorContext, source: Arc<dyn InsiderSource>) -> Self {
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
            .fetch(provider_id, cancel, self.source.fetch_filings(&symbol))
            .await
        {
            Ok(rows) => {
                match normalize_insider_rows(&symbol, &rows, provider_id, self.ctx.clock.now(), version)
                {
                    Ok(records) => self.ctx.write_records(&records).await,
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
impl Collector for InsiderTradesCollector {
    fn id(&self) -> &str {
        COLLECTOR_ID
    }

    async fn collect(&self, targets: &[String], cancel: &CancellationToken) -> CollectionReport {
        self.ctx
            .run_targets(COLLECTOR_ID, targets, cancel, |t| self.collect_target(t, cancel))
            .await
    }
}

/// `"S - Sale+OE"` splits into code `S` and description `Sale+OE`.
fn split_trade_type(raw: &str) -> (String, Option<String>) {
    match raw.split_once(" - ") {
        Some((code, desc)) => (code.trim().to_string(), non_empty(Some(desc))),
        None => (raw.trim().to_string(), None),
    }
}

fn parse_filed_at(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn normalize_row(row: &InsiderRow) -> Option<InsiderTrade> {
    let filed_at = parse_filed_at(&row.filing_date)?;
    let insider_name = non_empty(Some(row.insider_name.as_str()))?;
    let (trade_code, trade_description) = split_trade_type(&row.trade_type);
    if trade_code.is_empty() {
        return None;
    }

    Some(InsiderTrade {
        ticker: row.ticker.trim().to_ascii_uppercase(),
        company_name: non_empty(Some(row.company_name.as_str())),
        insider_name,
        title: non_empty(Some(row.title.as_str())),
        trade_code,
        trade_description,
        filed_at,
        trade_date: NaiveDate::parse_from_str(row.trade_date.trim(), "%Y-%m-%d").ok(),
        price: parse_decimal(Some(row.price.as_str())),
        quantity: parse_i64(Some(row.quantity.as_str())),
        shares_owned: parse_i64(Some(row.shares_owned.as_str())),
        ownership_change: non_empty(Some(row.ownership_change.as_str())),
        value: parse_decimal(Some(row.value.as_str())),
    })
}

/// Screener rows for `symbol` as canonical records. Rows for other tickers
/// are ignored; unreadable rows are skipped, and a page where every row is
/// unreadable is rejected.
pub fn normalize_insider_rows(
    symbol: &str,
    rows: &[InsiderRow],
    source: &str,
    collected_at: DateTime<Utc>,
    version: i64,
) -> Result<Vec<CanonicalRecord>> {
    let relevant: Vec<&InsiderRow> = rows
        .iter()
        .filter(|r| r.ticker.trim().eq_ignore_ascii_case(symbol))
        .collect();

    let mut records = Vec::with_capacity(relevant.len());
    for row in &relevant {
        match normalize_row(row) {
            Some(trade) => records.push(CanonicalRecord::new(
                RecordPayload::InsiderTrade(trade),
                source,
                collected_at,
                version,
            )),
            None => debug!("Skipping unreadable insider row for {}: {:?}", symbol, row),
        }
    }

    if records.is_empty() && !relevant.is_empty() {
        return Err(Error::Normalization(format!(
            "none of {} insider rows for {} could be read",
            relevant.len(),
            symbol
        )));
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn row() -> InsiderRow {
        InsiderRow {
            filing_date: "2024-01-05 16:30:12".to_string(),
            trade_date: "2024-01-03".to_string(),
            ticker: "AAPL".to_string(),
            company_name: "Apple Inc.".to_string(),
            insider_name: "Cook Timothy D".to_string(),
            title: "CEO".to_string(),
            trade_type: "S - Sale+OE".to_string(),
            price: "$185.50".to_string(),
            quantity: "-5,000".to_string(),
            shares_owned: "3,280,000".to_string(),
            ownership_change: "-2%".to_string(),
            value: "-$927,500".to_string(),
        }
    }

    #[test]
    fn test_normalize_row() {
        let records =
            normalize_insider_rows("AAPL", &[row()], "OPENINSIDER", Utc::now(), 9).unwrap();
        assert_eq!(records.len(), 1);
        let RecordPayload::InsiderTrade(ref t) = records[0].payload else {
            panic!("wrong payload");
        };
        assert_eq!(t.trade_code, "S");
        assert_eq!(t.trade_description.as_deref(), Some("Sale+OE"));
        assert_eq!(t.price, Some(dec!(185.50)));
        assert_eq!(t.quantity, Some(-5000));
        assert_eq!(t.shares_owned, Some(3_280_000));
        assert_eq!(t.value, Some(dec!(-927500)));
        assert_eq!(t.trade_date, NaiveDate::from_ymd_opt(2024, 1, 3));
    }

    #[test]
    fn test_other_tickers_are_ignored() {
        let mut other = row();
        other.ticker = "MSFT".to_string();
        let records =
            normalize_insider_rows("AAPL", &[other], "OPENINSIDER", Utc::now(), 1).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_missing_optional_cells_stay_empty() {
        let mut sparse = row();
        sparse.price = String::new();
        sparse.ownership_change = "New".to_string();
        sparse.title = String::new();
        let records =
            normalize_insider_rows("AAPL", &[sparse], "OPENINSIDER", Utc::now(), 1).unwrap();
        let RecordPayload::InsiderTrade(ref t) = records[0].payload else {
            panic!("wrong payload");
        };
        assert_eq!(t.price, None);
        assert_eq!(t.title, None);
        assert_eq!(t.ownership_change.as_deref(), Some("New"));
    }

    #[test]
    fn test_all_rows_unreadable_is_malformed() {
        let mut broken = row();
        broken.filing_date = "yesterday".to_string();
        assert!(matches!(
            normalize_insider_rows("AAPL", &[broken], "OPENINSIDER", Utc::now(), 1),
            Err(Error::Normalization(_))
        ));
    }
}

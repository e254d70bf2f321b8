//! OpenInsider screener client.
//!
//! OpenInsider has no API; the screener page renders filings as an HTML
//! table (`table.tinytable`) which is scraped with `scraper`.

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;

use crate::errors::ProviderError;
use crate::models::{InsiderRow, RateLimit};
use crate::provider::{http_client, InsiderSource, ProviderClient};

const BASE_URL: &str = "http://openinsider.com";
pub const PROVIDER_ID: &str = "OPENINSIDER";

/// Screener columns: X, filing date, trade date, ticker, company, insider,
/// title, trade type, price, qty, owned, delta owned, value.
const MIN_COLUMNS: usize = 13;

/// OpenInsider screener client.
pub struct OpenInsiderProvider {
    client: Client,
    base_url: String,
    lookback_days: u32,
}

impl OpenInsiderProvider {
    pub fn new() -> Self {
        Self::with_timeout(super::DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            client: http_client(timeout),
            base_url: BASE_URL.to_string(),
            lookback_days: 730,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Filing-date lookback passed to the screener (`fd` parameter).
    pub fn with_lookback_days(mut self, days: u32) -> Self {
        self.lookback_days = days;
        self
    }

    fn screener_url(&self, symbol: &str) -> Result<reqwest::Url, ProviderError> {
        let lookback = self.lookback_days.to_string();
        reqwest::Url::parse_with_params(
            &format!("{}/screener", self.base_url),
            &[
                ("s", symbol),
                ("fd", lookback.as_str()),
                ("td", "0"),
                ("xp", "1"),
                ("xs", "1"),
                ("sortcol", "0"),
                ("cnt", "100"),
                ("page", "1"),
            ],
        )
        .map_err(|e| ProviderError::Rejected {
            provider: PROVIDER_ID.to_string(),
            message: format!("Failed to build URL: {}", e),
        })
    }
}

impl Default for OpenInsiderProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn selector(css: &str) -> Result<Selector, ProviderError> {
    Selector::parse(css).map_err(|e| ProviderError::Malformed {
        provider: PROVIDER_ID.to_string(),
        message: format!("invalid selector '{}': {}", css, e),
    })
}

fn cell_text(cell: &ElementRef<'_>) -> String {
    cell.text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parses the screener page into raw rows.
///
/// A page without the results table is treated as malformed; a table with no
/// body rows means the ticker has no filings in the lookback.
pub fn parse_screener_html(html: &str) -> Result<Vec<InsiderRow>, ProviderError> {
    let document = Html::parse_document(html);
    let table_sel = selector("table.tinytable")?;
    let row_sel = selector("tbody tr")?;
    let cell_sel = selector("td")?;

    let table = document
        .select(&table_sel)
        .next()
        .ok_or_else(|| ProviderError::Malformed {
            provider: PROVIDER_ID.to_string(),
            message: "results table not found".to_string(),
        })?;

    let mut rows = Vec::new();
    for tr in table.select(&row_sel) {
        let cells: Vec<String> = tr.select(&cell_sel).map(|c| cell_text(&c)).collect();
        if cells.len() < MIN_COLUMNS {
            debug!("Skipping screener row with {} cells", cells.len());
            continue;
        }
        rows.push(InsiderRow {
            filing_date: cells[1].clone(),
            trade_date: cells[2].clone(),
            ticker: cells[3].clone(),
            company_name: cells[4].clone(),
            insider_name: cells[5].clone(),
            title: cells[6].clone(),
            trade_type: cells[7].clone(),
            price: cells[8].clone(),
            quantity: cells[9].clone(),
            shares_owned: cells[10].clone(),
            ownership_change: cells[11].clone(),
            value: cells[12].clone(),
        });
    }

    Ok(rows)
}

impl ProviderClient for OpenInsiderProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn rate_limit(&self) -> RateLimit {
        RateLimit::per_minute(60)
    }
}

#[async_trait]
impl InsiderSource for OpenInsiderProvider {
    async fn fetch_filings(&self, symbol: &str) -> Result<Vec<InsiderRow>, ProviderError> {
        let url = self.screener_url(symbol)?;
        debug!("OpenInsider request: {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(PROVIDER_ID, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::from_status(PROVIDER_ID, status));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::from_reqwest(PROVIDER_ID, e))?;

        parse_screener_html(&body)
    }
}

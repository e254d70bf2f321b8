//! Raw price payloads as returned by the price providers.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Request for daily prices of one symbol over an inclusive date range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceRequest {
    pub symbol: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// One daily bar from the Yahoo chart endpoint.
///
/// Values are untouched provider floats; Yahoo reports volume as an integer.
#[derive(Debug, Clone, PartialEq)]
pub struct YahooBar {
    /// Unix seconds of the bar's trading session.
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub adjclose: f64,
    pub volume: u64,
}

/// Alpha Vantage `GLOBAL_QUOTE` body. Every field arrives as a string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalQuote {
    #[serde(rename = "01. symbol")]
    pub symbol: Option<String>,
    #[serde(rename = "02. open")]
    pub open: Option<String>,
    #[serde(rename = "03. high")]
    pub high: Option<String>,
    #[serde(rename = "04. low")]
    pub low: Option<String>,
    #[serde(rename = "05. price")]
    pub price: Option<String>,
    #[serde(rename = "06. volume")]
    pub volume: Option<String>,
    #[serde(rename = "07. latest trading day")]
    pub latest_trading_day: Option<String>,
    #[serde(rename = "08. previous close")]
    pub previous_close: Option<String>,
    #[serde(rename = "09. change")]
    pub change: Option<String>,
    #[serde(rename = "10. change percent")]
    pub change_percent: Option<String>,
}

/// Price payload tagged with the provider shape it came in.
#[derive(Debug, Clone, PartialEq)]
pub enum RawPrices {
    Yahoo(Vec<YahooBar>),
    AlphaVantage(GlobalQuote),
}

//! Raw insider filing rows scraped from the OpenInsider screener.

use serde::{Deserialize, Serialize};

/// One row of the screener table, cell text trimmed but otherwise as shown.
///
/// Example cell values: `filing_date = "2024-01-05 16:30:12"`,
/// `price = "$185.50"`, `quantity = "-5,000"`, `ownership_change = "-3%"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsiderRow {
    pub filing_date: String,
    pub trade_date: String,
    pub ticker: String,
    pub company_name: String,
    pub insider_name: String,
    pub title: String,
    pub trade_type: String,
    pub price: String,
    pub quantity: String,
    pub shares_owned: String,
    pub ownership_change: String,
    pub value: String,
}

//! Raw company overview payload.

use serde::{Deserialize, Serialize};

/// Alpha Vantage `OVERVIEW` body. Numbers arrive as strings and may be
/// `"None"` or `"-"` when the provider has no value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompanyOverview {
    #[serde(rename = "Symbol")]
    pub symbol: Option<String>,
    #[serde(rename = "Name")]
    pub name: Option<String>,
    #[serde(rename = "Exchange")]
    pub exchange: Option<String>,
    #[serde(rename = "Currency")]
    pub currency: Option<String>,
    #[serde(rename = "Country")]
    pub country: Option<String>,
    #[serde(rename = "Sector")]
    pub sector: Option<String>,
    #[serde(rename = "Industry")]
    pub industry: Option<String>,
    #[serde(rename = "MarketCapitalization")]
    pub market_capitalization: Option<String>,
    #[serde(rename = "EBITDA")]
    pub ebitda: Option<String>,
    #[serde(rename = "PERatio")]
    pub pe_ratio: Option<String>,
    #[serde(rename = "PEGRatio")]
    pub peg_ratio: Option<String>,
    #[serde(rename = "BookValue")]
    pub book_value: Option<String>,
    #[serde(rename = "DividendYield")]
    pub dividend_yield: Option<String>,
    #[serde(rename = "EPS")]
    pub eps: Option<String>,
    #[serde(rename = "ProfitMargin")]
    pub profit_margin: Option<String>,
    #[serde(rename = "OperatingMarginTTM")]
    pub operating_margin_ttm: Option<String>,
    #[serde(rename = "ReturnOnAssetsTTM")]
    pub return_on_assets_ttm: Option<String>,
    #[serde(rename = "ReturnOnEquityTTM")]
    pub return_on_equity_ttm: Option<String>,
    #[serde(rename = "RevenueTTM")]
    pub revenue_ttm: Option<String>,
    #[serde(rename = "AnalystTargetPrice")]
    pub analyst_target_price: Option<String>,
    #[serde(rename = "52WeekHigh")]
    pub week_52_high: Option<String>,
    #[serde(rename = "52WeekLow")]
    pub week_52_low: Option<String>,
    #[serde(rename = "50DayMovingAverage")]
    pub day_50_moving_average: Option<String>,
    #[serde(rename = "200DayMovingAverage")]
    pub day_200_moving_average: Option<String>,
}

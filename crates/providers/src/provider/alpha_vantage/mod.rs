//! Alpha Vantage client.
//!
//! Serves two endpoints:
//! - `GLOBAL_QUOTE`: latest daily quote, used as the price fallback
//! - `OVERVIEW`: company fundamentals
//!
//! Note: the free tier allows 25 requests per day.

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::errors::ProviderError;
use crate::models::{CompanyOverview, GlobalQuote, PriceRequest, RateLimit, RawPrices};
use crate::provider::{http_client, FundamentalsSource, PriceSource, ProviderClient};

const BASE_URL: &str = "https://www.alphavantage.co/query";
pub const PROVIDER_ID: &str = "ALPHA_VANTAGE";

/// Alpha Vantage API client.
pub struct AlphaVantageProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

// ============================================================================
// Response envelopes
// ============================================================================

#[derive(Debug, Deserialize)]
struct GlobalQuoteResponse {
    #[serde(rename = "Global Quote")]
    global_quote: Option<GlobalQuote>,
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OverviewResponse {
    #[serde(flatten)]
    overview: CompanyOverview,
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
}

impl AlphaVantageProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_timeout(api_key, super::DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(api_key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: http_client(timeout),
            api_key: api_key.into(),
            base_url: BASE_URL.to_string(),
        }
    }

    /// Points the client at another host (used against local fakes).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Fetch the latest quote for a symbol.
    pub async fn fetch_global_quote(&self, symbol: &str) -> Result<GlobalQuote, ProviderError> {
        let body = self
            .fetch(&[("function", "GLOBAL_QUOTE"), ("symbol", symbol)])
            .await?;
        let response: GlobalQuoteResponse = parse_body(&body)?;

        check_api_error(
            &response.error_message,
            &response.note,
            &response.information,
            symbol,
        )?;

        match response.global_quote {
            Some(quote) if quote.symbol.is_some() => Ok(quote),
            _ => Err(ProviderError::NotFound {
                provider: PROVIDER_ID.to_string(),
                query: symbol.to_string(),
            }),
        }
    }

    /// Fetch company overview (fundamentals) for a symbol.
    pub async fn fetch_company_overview(
        &self,
        symbol: &str,
    ) -> Result<CompanyOverview, ProviderError> {
        let body = self
            .fetch(&[("function", "OVERVIEW"), ("symbol", symbol)])
            .await?;
        let response: OverviewResponse = parse_body(&body)?;

        check_api_error(
            &response.error_message,
            &response.note,
            &response.information,
            symbol,
        )?;

        // Unknown symbols come back as an empty object.
        if response.overview.symbol.is_none() {
            return Err(ProviderError::NotFound {
                provider: PROVIDER_ID.to_string(),
                query: symbol.to_string(),
            });
        }

        Ok(response.overview)
    }

    async fn fetch(&self, params: &[(&str, &str)]) -> Result<String, ProviderError> {
        let mut all_params: Vec<(&str, &str)> = params.to_vec();
        all_params.push(("apikey", &self.api_key));

        let url = reqwest::Url::parse_with_params(&self.base_url, &all_params).map_err(|e| {
            ProviderError::Rejected {
                provider: PROVIDER_ID.to_string(),
                message: format!("Failed to build URL: {}", e),
            }
        })?;

        debug!("Alpha Vantage request: {}", redact(url.as_str(), &self.api_key));

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(PROVIDER_ID, e.without_url()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::from_status(PROVIDER_ID, status));
        }

        response
            .text()
            .await
            .map_err(|e| ProviderError::from_reqwest(PROVIDER_ID, e.without_url()))
    }
}

fn redact(url: &str, api_key: &str) -> String {
    if api_key.is_empty() {
        url.to_string()
    } else {
        url.replace(api_key, "***")
    }
}

fn parse_body<T: for<'de> Deserialize<'de>>(body: &str) -> Result<T, ProviderError> {
    serde_json::from_str(body).map_err(|e| ProviderError::Malformed {
        provider: PROVIDER_ID.to_string(),
        message: e.to_string(),
    })
}

/// Check for API-level errors reported inside a 200 response.
fn check_api_error(
    error_message: &Option<String>,
    note: &Option<String>,
    information: &Option<String>,
    symbol: &str,
) -> Result<(), ProviderError> {
    if let Some(ref msg) = error_message {
        if msg.contains("Invalid API call") || msg.contains("not found") {
            return Err(ProviderError::NotFound {
                provider: PROVIDER_ID.to_string(),
                query: symbol.to_string(),
            });
        }
        return Err(ProviderError::Rejected {
            provider: PROVIDER_ID.to_string(),
            message: msg.clone(),
        });
    }

    for msg in [note, information].into_iter().flatten() {
        if is_rate_limit_message(msg) {
            return Err(ProviderError::RateLimited {
                provider: PROVIDER_ID.to_string(),
            });
        }
        warn!("Alpha Vantage notice: {}", msg);
    }

    Ok(())
}

fn is_rate_limit_message(msg: &str) -> bool {
    let lower = msg.to_ascii_lowercase();
    lower.contains("api call frequency")
        || lower.contains("rate limit")
        || lower.contains("requests per day")
}

impl ProviderClient for AlphaVantageProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn rate_limit(&self) -> RateLimit {
        RateLimit::per_day(25)
    }
}

#[async_trait]
impl PriceSource for AlphaVantageProvider {
    /// Only the latest session is available on the free tier, so the
    /// requested range is ignored.
    async fn fetch_prices(&self, request: &PriceRequest) -> Result<RawPrices, ProviderError> {
        self.fetch_global_quote(&request.symbol)
            .await
            .map(RawPrices::AlphaVantage)
    }
}

#[async_trait]
impl FundamentalsSource for AlphaVantageProvider {
    async fn fetch_overview(&self, symbol: &str) -> Result<CompanyOverview, ProviderError> {
        self.fetch_company_overview(symbol).await
    }
}

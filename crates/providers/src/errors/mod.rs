//! Error types and retry classification for provider clients.
//!
//! This module provides:
//! - [`ProviderError`]: every failure a provider call can produce
//! - [`RetryClass`]: how the caller should react to it

mod retry;

pub use retry::RetryClass;

use thiserror::Error;

/// Errors returned by provider clients.
///
/// Each variant maps to a [`RetryClass`] through [`retry_class`](Self::retry_class).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// The request did not complete in time.
    #[error("Timeout: {provider}")]
    Timeout { provider: String },

    /// The connection failed before an HTTP status was received.
    #[error("Transport error: {provider} - {message}")]
    Transport { provider: String, message: String },

    /// The provider answered with a non-success HTTP status.
    /// 5xx is transient, anything else is terminal.
    #[error("HTTP {status} from {provider}")]
    Http { provider: String, status: u16 },

    /// The provider reported that its quota is exhausted (HTTP 429 or an
    /// equivalent message inside a 200 response).
    #[error("Rate limited: {provider}")]
    RateLimited { provider: String },

    /// The provider does not know the requested symbol or feed.
    #[error("Not found: {provider} - {query}")]
    NotFound { provider: String, query: String },

    /// The provider rejected the request itself (bad key, invalid call).
    #[error("Rejected by {provider}: {message}")]
    Rejected { provider: String, message: String },

    /// The payload could not be decoded into the provider's raw shape.
    #[error("Malformed response from {provider}: {message}")]
    Malformed { provider: String, message: String },
}

impl ProviderError {
    /// Returns the retry classification for this error.
    ///
    /// ```
    /// use findash_providers::errors::{ProviderError, RetryClass};
    ///
    /// let error = ProviderError::Timeout { provider: "YAHOO".to_string() };
    /// assert_eq!(error.retry_class(), RetryClass::WithBackoff);
    ///
    /// let error = ProviderError::RateLimited { provider: "ALPHA_VANTAGE".to_string() };
    /// assert_eq!(error.retry_class(), RetryClass::AfterWindowReset);
    /// ```
    pub fn retry_class(&self) -> RetryClass {
        match self {
            Self::Timeout { .. } | Self::Transport { .. } => RetryClass::WithBackoff,
            Self::Http { status, .. } if *status >= 500 => RetryClass::WithBackoff,
            Self::RateLimited { .. } => RetryClass::AfterWindowReset,
            Self::Http { .. }
            | Self::NotFound { .. }
            | Self::Rejected { .. }
            | Self::Malformed { .. } => RetryClass::Never,
        }
    }

    /// The provider that produced this error.
    pub fn provider(&self) -> &str {
        match self {
            Self::Timeout { provider }
            | Self::Transport { provider, .. }
            | Self::Http { provider, .. }
            | Self::RateLimited { provider }
            | Self::NotFound { provider, .. }
            | Self::Rejected { provider, .. }
            | Self::Malformed { provider, .. } => provider,
        }
    }

    /// Maps a reqwest failure onto the provider error taxonomy.
    pub fn from_reqwest(provider: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                provider: provider.to_string(),
            }
        } else if let Some(status) = err.status() {
            Self::from_status(provider, status)
        } else if err.is_decode() {
            Self::Malformed {
                provider: provider.to_string(),
                message: err.to_string(),
            }
        } else {
            Self::Transport {
                provider: provider.to_string(),
                message: err.to_string(),
            }
        }
    }

    /// Maps a non-success HTTP status.
    pub fn from_status(provider: &str, status: reqwest::StatusCode) -> Self {
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            Self::RateLimited {
                provider: provider.to_string(),
            }
        } else {
            Self::Http {
                provider: provider.to_string(),
                status: status.as_u16(),
            }
        }
    }
}

//! Core error types for the findash pipeline.
//!
//! This module defines storage-agnostic error types. Storage-specific errors
//! (from Diesel, SQLite, etc.) are converted to these types by the storage layer.

use chrono::ParseError as ChronoParseError;
use thiserror::Error;

use findash_providers::ProviderError;

/// Type alias for Result using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Root error type for the pipeline.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database operation failed: {0}")]
    Database(#[from] DatabaseError),

    #[error("Provider call failed: {0}")]
    Provider(#[from] ProviderError),

    /// Static configuration is malformed. Only raised while starting up.
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Rate budget for {provider} exhausted until {retry_at}")]
    RateLimitExceeded {
        provider: String,
        retry_at: chrono::DateTime<chrono::Utc>,
    },

    #[error("Timed out waiting for {provider} rate budget")]
    RateLimitTimeout { provider: String },

    #[error("Unknown provider '{0}'")]
    UnknownProvider(String),

    #[error("Unknown collector '{0}'")]
    UnknownCollector(String),

    /// A provider payload could not be turned into a canonical record.
    #[error("Normalization failed: {0}")]
    Normalization(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

/// Storage-agnostic error type for store operations.
///
/// This enum uses `String` for all error details, allowing the storage layer
/// to convert storage-specific errors (Diesel, SQLite, etc.) into this format.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to establish a database connection.
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to create or configure the connection pool.
    #[error("Failed to create database pool: {0}")]
    PoolCreationFailed(String),

    /// A database query failed to execute.
    #[error("Database query failed: {0}")]
    QueryFailed(String),

    /// The requested record was not found.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// A database transaction failed.
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Database migration failed.
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// A stored row could not be decoded back into a record.
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// Internal/unexpected database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl Error {
    /// Transient failures are worth another attempt after a backoff.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Provider(e) => e.retry_class() == findash_providers::RetryClass::WithBackoff,
            Error::Database(DatabaseError::ConnectionFailed(_))
            | Error::Database(DatabaseError::TransactionFailed(_)) => true,
            _ => false,
        }
    }
}

// === From implementations for common error types ===

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Normalization(err.to_string())
    }
}

impl From<ChronoParseError> for Error {
    fn from(err: ChronoParseError) -> Self {
        Error::Normalization(err.to_string())
    }
}

impl From<Error> for String {
    fn from(err: Error) -> Self {
        err.to_string()
    }
}

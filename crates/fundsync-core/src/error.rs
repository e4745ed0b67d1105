//! Error types for ingestion operations.
//!
//! This module defines [`IngestError`] which covers all error cases that can
//! occur when fetching, normalizing, or persisting fundamentals data.

use thiserror::Error;

/// Errors that can occur during ingestion operations.
#[derive(Error, Debug)]
pub enum IngestError {
    /// Network-related errors (connection failures, timeouts, etc.).
    #[error("Network error: {0}")]
    Network(String),

    /// Rate limit exceeded by a provider.
    #[error("Rate limited by {provider}: retry after {retry_after:?}")]
    RateLimited {
        /// The provider that rate limited the request.
        provider: String,
        /// Suggested time to wait before retrying.
        retry_after: Option<std::time::Duration>,
    },

    /// Error parsing data from a provider.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Error interacting with the persistent store.
    #[error("Store error: {0}")]
    Store(String),

    /// A record failed validation before persistence.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// The requested provider is not configured.
    #[error("Provider not configured: {0}")]
    ProviderNotConfigured(String),

    /// The symbol universe could not be acquired.
    #[error("Universe error: {0}")]
    Universe(String),

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Any other error.
    #[error("{0}")]
    Other(String),
}

/// Result type alias using [`IngestError`].
pub type Result<T> = std::result::Result<T, IngestError>;

//! Exchange-rate sources
//!
//! A [`RateSource`] performs one provider call per invocation and either
//! returns a validated, rounded [`RateSample`] or a [`FetchError`]. Callers
//! treat an error as "skip this cycle"; there is no retry and no default
//! value.

mod provider;

pub use provider::HttpRateSource;

use async_trait::async_trait;

use crate::models::RateSample;

/// Fetches the current exchange rate
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Fetch a fresh sample
    async fn fetch(&self) -> Result<RateSample, FetchError>;
}

/// Rate provider errors
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("provider returned status {0}")]
    Status(u16),

    #[error("response is not valid JSON: {0}")]
    Decode(String),

    #[error("field '{0}' missing from response")]
    MissingField(String),

    #[error("field '{path}' is not a number: {value}")]
    InvalidValue { path: String, value: String },

    #[error("rate {0} is not positive")]
    NonPositive(String),
}

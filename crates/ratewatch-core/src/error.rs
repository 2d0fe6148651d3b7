//! Error types for RateWatch

use thiserror::Error;

pub use crate::alerting::DeliveryError;
pub use crate::config::ConfigError;
pub use crate::rate::FetchError;

/// Result type alias using RateWatch's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for RateWatch operations
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error (fatal at startup)
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Rate provider error
    #[error("Rate fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// Notification delivery error
    #[error("Delivery failed: {0}")]
    Delivery(#[from] DeliveryError),

    /// Scheduler lifecycle error
    #[error("Scheduler error: {0}")]
    Schedule(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a config validation error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(ConfigError::Invalid(msg.into()))
    }

    /// Create a scheduler error
    pub fn schedule(msg: impl Into<String>) -> Self {
        Self::Schedule(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

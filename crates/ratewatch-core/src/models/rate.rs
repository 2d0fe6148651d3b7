//! Exchange-rate samples

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

/// A single reading from the rate provider.
///
/// Samples are created by a [`RateSource`](crate::rate::RateSource) on every
/// fetch and are never shared between two trigger firings. A reading that
/// fails validation becomes a `FetchError` instead of a sample, so every
/// sample is valid; `valid` is carried for serialized output only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateSample {
    value: Decimal,
    fetched_at: DateTime<Utc>,
    valid: bool,
}

impl RateSample {
    /// Create a valid sample stamped with the current time
    pub fn new(value: Decimal) -> Self {
        Self::at(value, Utc::now())
    }

    /// Create a valid sample with an explicit fetch time
    pub fn at(value: Decimal, fetched_at: DateTime<Utc>) -> Self {
        Self {
            value,
            fetched_at,
            valid: true,
        }
    }

    /// The rounded rate value
    pub fn value(&self) -> Decimal {
        self.value
    }

    /// When the sample was fetched
    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    /// Whether the sample passed provider validation; always true
    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

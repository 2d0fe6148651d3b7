//! HTTP JSON rate provider

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::Value;
use tracing::debug;

use super::{FetchError, RateSource};
use crate::config::ProviderConfig;
use crate::error::{Error, Result};
use crate::models::RateSample;

/// Reads a numeric field out of a JSON document served over HTTP GET
pub struct HttpRateSource {
    client: Client,
    url: String,
    path: Vec<String>,
    precision: u32,
}

impl HttpRateSource {
    /// Create a source from provider configuration
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: config.url.clone(),
            path: config.rate_path.split('.').map(str::to_string).collect(),
            precision: config.precision,
        })
    }

    async fn fetch_document(&self) -> std::result::Result<Value, FetchError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| FetchError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))
    }
}

#[async_trait]
impl RateSource for HttpRateSource {
    async fn fetch(&self) -> std::result::Result<RateSample, FetchError> {
        let document = self.fetch_document().await?;
        let value = extract_rate(&document, &self.path, self.precision)?;

        debug!(url = %self.url, rate = %value, "Fetched rate");
        Ok(RateSample::new(value))
    }
}

/// Walk `path` into `document` and parse the leaf as a positive decimal
/// rounded to `precision` fractional digits
pub fn extract_rate(
    document: &Value,
    path: &[String],
    precision: u32,
) -> std::result::Result<Decimal, FetchError> {
    let joined = path.join(".");

    let leaf = path
        .iter()
        .try_fold(document, |node, key| node.get(key.as_str()))
        .ok_or_else(|| FetchError::MissingField(joined.clone()))?;

    let raw = match leaf {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        other => {
            return Err(FetchError::InvalidValue {
                path: joined,
                value: other.to_string(),
            })
        }
    };

    let parsed = raw
        .parse::<Decimal>()
        .or_else(|_| Decimal::from_scientific(&raw))
        .map_err(|_| FetchError::InvalidValue {
            path: joined,
            value: raw.clone(),
        })?;

    let rounded = parsed.round_dp_with_strategy(precision, RoundingStrategy::MidpointNearestEven);
    if rounded.is_sign_negative() || rounded.is_zero() {
        return Err(FetchError::NonPositive(rounded.to_string()));
    }

    Ok(rounded)
}

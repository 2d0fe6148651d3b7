//! Configuration management for RateWatch
//!
//! Sources are layered: built-in defaults, then an optional TOML file, then
//! `RATEWATCH__SECTION__KEY` environment variables. The result is validated
//! once; an invalid configuration never reaches the scheduler.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

use crate::models::{AlertCondition, AlertRule, AlertRuleSet, Channel, TriggerRule};
use crate::schedule::ScheduleZone;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "RATEWATCH";

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("{0}")]
    Invalid(String),
}

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Webhook server configuration
    pub server: ServerConfig,

    /// Rate provider configuration
    pub provider: ProviderConfig,

    /// Messaging transport configuration
    pub transport: TransportConfig,

    /// Inbound webhook configuration
    pub webhook: WebhookConfig,

    /// Message templates
    pub messages: MessageTemplates,

    /// Scheduler configuration
    pub schedule: ScheduleConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from an optional file plus environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.schedule.rules.validate().map_err(ConfigError::Invalid)?;

        url::Url::parse(&self.provider.url)
            .map_err(|e| invalid(format!("provider.url '{}': {e}", self.provider.url)))?;
        url::Url::parse(&self.transport.base_url).map_err(|e| {
            invalid(format!("transport.base_url '{}': {e}", self.transport.base_url))
        })?;

        if self.provider.rate_path.split('.').any(str::is_empty) {
            return Err(invalid(format!(
                "provider.rate_path '{}' has an empty segment",
                self.provider.rate_path
            )));
        }
        if self.provider.precision > MAX_PRECISION {
            return Err(invalid(format!(
                "provider.precision {} exceeds {MAX_PRECISION}",
                self.provider.precision
            )));
        }
        if self.provider.timeout.is_zero() || self.transport.timeout.is_zero() {
            return Err(invalid("timeouts must be positive"));
        }

        if !self.transport.dry_run {
            for (name, value) in [
                ("channel_access_token", &self.transport.channel_access_token),
                ("channel_secret", &self.transport.channel_secret),
                ("recipient_id", &self.transport.recipient_id),
            ] {
                if value.as_deref().map_or(true, |v| v.trim().is_empty()) {
                    return Err(invalid(format!(
                        "transport.{name} is required unless transport.dry_run is set"
                    )));
                }
            }
        }

        if self.webhook.query_keyword.trim().is_empty() {
            return Err(invalid("webhook.query_keyword must not be empty"));
        }

        Ok(())
    }
}

const MAX_PRECISION: u32 = 10;

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// HTTP port
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

impl ServerConfig {
    /// Socket address string for binding
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Rate provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Endpoint returning the rate document
    pub url: String,
    /// Dotted path to the rate field
    pub rate_path: String,
    /// Request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Fractional digits kept after rounding
    pub precision: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            url: "https://api.exchangerate.fun/latest?base=USD".to_string(),
            rate_path: "rates.TWD".to_string(),
            timeout: Duration::from_secs(10),
            precision: 4,
        }
    }
}

/// Messaging transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Messaging API base URL
    pub base_url: String,
    /// Bearer token for the messaging API
    pub channel_access_token: Option<String>,
    /// Secret used to sign inbound chat webhooks
    pub channel_secret: Option<String>,
    /// Recipient for direct pushes (user, group or room id)
    pub recipient_id: Option<String>,
    /// Request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Log messages instead of sending them
    pub dry_run: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.line.me".to_string(),
            channel_access_token: None,
            channel_secret: None,
            recipient_id: None,
            timeout: Duration::from_secs(10),
            dry_run: false,
        }
    }
}

/// Inbound webhook configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Chat command that triggers a rate query (case-insensitive)
    pub query_keyword: String,
    /// Token expected in the page-feed subscription handshake
    pub verify_token: Option<String>,
    /// Channel for relayed page posts
    pub relay_channel: Channel,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            query_keyword: "匯率".to_string(),
            verify_token: None,
            relay_channel: Channel::Direct,
        }
    }
}

/// Notification text templates
///
/// Placeholders: `{rate}`, `{limit}`, `{low}`, `{high}` and, for relays,
/// `{message}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageTemplates {
    /// Unconditional scheduled broadcast
    pub scheduled: String,
    /// Threshold rule fired
    pub below_threshold: String,
    /// Band rule fired
    pub within_band: String,
    /// Reply to an interactive query
    pub query_reply: String,
    /// Reply when the provider is unreachable
    pub query_unavailable: String,
    /// Relayed page post
    pub relay: String,
    /// Stand-in for a post without text
    pub relay_placeholder: String,
}

impl Default for MessageTemplates {
    fn default() -> Self {
        Self {
            scheduled: "📢 USD/TWD rate today: {rate}".to_string(),
            below_threshold: "⚠️ USD/TWD fell below {limit}: now {rate}".to_string(),
            within_band: "🔔 USD/TWD is within {low} – {high}: now {rate}".to_string(),
            query_reply: "Current USD/TWD rate: {rate}".to_string(),
            query_unavailable: "Exchange rate data is unavailable, please try again later."
                .to_string(),
            relay: "📰 New page post: {message}".to_string(),
            relay_placeholder: "📰 New post".to_string(),
        }
    }
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Zone used for wall-clock triggers and windows
    pub timezone: ScheduleZone,
    /// How late a wall-clock firing may run before it counts as missed
    #[serde(with = "humantime_serde")]
    pub misfire_grace: Duration,
    /// How long shutdown waits for in-flight cycles
    #[serde(with = "humantime_serde")]
    pub shutdown_grace: Duration,
    /// Rules to register
    pub rules: AlertRuleSet,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            timezone: ScheduleZone::Local,
            misfire_grace: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(10),
            rules: default_rules(),
        }
    }
}

/// Daily broadcasts at 00:00-04:00 plus a half-hourly check below 29
fn default_rules() -> AlertRuleSet {
    let mut rules: Vec<AlertRule> = (0..5)
        .map(|hour| {
            AlertRule::new(
                format!("daily-{hour:02}00"),
                TriggerRule::FixedTime { hour, minute: 0 },
            )
        })
        .collect();

    rules.push(
        AlertRule::new(
            "below-29",
            TriggerRule::RepeatingInterval {
                period_minutes: 30,
                window: None,
            },
        )
        .with_condition(AlertCondition::BelowThreshold {
            limit: Decimal::new(2900, 2),
        }),
    );

    AlertRuleSet::new(rules).unwrap_or_default()
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Log format (json or pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Install the global tracing subscriber; `RUST_LOG` wins over `level`
    pub fn init(&self, verbose: bool) {
        let level = if verbose { "debug" } else { self.level.as_str() };
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        match self.format.as_str() {
            "json" => fmt().json().with_env_filter(filter).init(),
            _ => fmt().with_env_filter(filter).init(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn dry_run() -> Config {
        let mut config = Config::default();
        config.transport.dry_run = true;
        config
    }

    #[test]
    fn test_defaults_are_daily_plus_threshold() {
        let config = dry_run();
        config.validate().unwrap();

        let rules: Vec<_> = config.schedule.rules.iter().collect();
        assert_eq!(rules.len(), 6);
        assert_eq!(rules[0].trigger, TriggerRule::FixedTime { hour: 0, minute: 0 });
        assert_eq!(
            rules[5].condition,
            AlertCondition::BelowThreshold { limit: dec!(29.00) }
        );
    }

    #[test]
    fn test_credentials_required_outside_dry_run() {
        let err = Config::default().validate().unwrap_err();
        assert!(err.to_string().contains("channel_access_token"), "{err}");
    }

    #[test]
    fn test_rejects_bad_provider_url() {
        let mut config = dry_run();
        config.provider.url = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let file = write_config(
            r#"
[provider]
url = "http://localhost:9000/latest"
timeout = "2s"

[transport]
dry_run = true

[schedule]
timezone = "+08:00"

[[schedule.rules]]
name = "weekday-noon"
channel = "broadcast"
trigger = { kind = "business_hours", days = ["Mon", "Tue"], hours = [12] }

[[schedule.rules]]
name = "band"
suppress_repeats = true
trigger = { kind = "repeating_interval", period_minutes = 10, window = { start_hour = 7, end_hour = 15 } }
condition = { kind = "within_band", low = "28.5", high = "28.8" }
"#,
        );

        let config = Config::load(Some(file.path())).unwrap();

        assert_eq!(config.provider.timeout, Duration::from_secs(2));
        assert_eq!(config.provider.rate_path, "rates.TWD");
        assert_eq!(config.schedule.rules.len(), 2);
        let band = config.schedule.rules.iter().nth(1).unwrap();
        assert!(band.suppress_repeats);
        assert_eq!(
            band.condition,
            AlertCondition::WithinBand {
                low: dec!(28.5),
                high: dec!(28.8)
            }
        );
    }

    #[test]
    fn test_load_rejects_invalid_rule() {
        let file = write_config(
            r#"
[transport]
dry_run = true

[[schedule.rules]]
name = "late"
trigger = { kind = "fixed_time", hour = 25 }
"#,
        );

        let err = Config::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)), "{err}");
    }

    #[test]
    fn test_missing_file_is_load_error() {
        let err = Config::load(Some(Path::new("/nonexistent/ratewatch.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
    }
}

//! Trigger and alert rule models

use chrono::Weekday;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

use super::notification::Channel;

/// Time-of-day gate for interval triggers, covering `[start_hour, end_hour)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourWindow {
    /// First hour (inclusive)
    pub start_hour: u32,
    /// Last hour (exclusive), at most 24
    pub end_hour: u32,
}

impl HourWindow {
    /// Create a window
    pub fn new(start_hour: u32, end_hour: u32) -> Self {
        Self {
            start_hour,
            end_hour,
        }
    }

    /// Whether a local hour falls inside the window
    pub fn contains(&self, hour: u32) -> bool {
        self.start_hour <= hour && hour < self.end_hour
    }

    fn validate(&self) -> Result<(), String> {
        if self.end_hour > 24 {
            return Err(format!("window end_hour {} exceeds 24", self.end_hour));
        }
        if self.start_hour >= self.end_hour {
            return Err(format!(
                "window start_hour {} must be before end_hour {}",
                self.start_hour, self.end_hour
            ));
        }
        Ok(())
    }
}

/// Longest accepted interval period
pub const MAX_INTERVAL: Duration = Duration::from_secs(366 * 24 * 60 * 60);

/// When a rule should be evaluated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerRule {
    /// Every day at a wall-clock time
    FixedTime {
        /// Hour (0-23)
        hour: u32,
        /// Minute (0-59)
        #[serde(default)]
        minute: u32,
    },
    /// Every `period` from engine start
    FixedInterval {
        /// Interval length
        #[serde(with = "humantime_serde")]
        period: Duration,
        /// Optional time-of-day gate
        #[serde(default)]
        window: Option<HourWindow>,
    },
    /// At every combination of the listed weekdays, hours and minutes
    #[serde(rename = "business_hours")]
    BusinessHoursPeriodic {
        /// Weekdays to fire on
        days: Vec<Weekday>,
        /// Hours to fire at
        hours: Vec<u32>,
        /// Minutes past each hour
        #[serde(default = "default_minutes")]
        minutes: Vec<u32>,
    },
    /// Every `period_minutes` minutes from engine start
    RepeatingInterval {
        /// Interval length in minutes
        period_minutes: u32,
        /// Optional time-of-day gate
        #[serde(default)]
        window: Option<HourWindow>,
    },
}

fn default_minutes() -> Vec<u32> {
    vec![0]
}

impl TriggerRule {
    /// Whether the trigger fires at wall-clock instants rather than relative intervals
    pub fn is_absolute(&self) -> bool {
        matches!(
            self,
            TriggerRule::FixedTime { .. } | TriggerRule::BusinessHoursPeriodic { .. }
        )
    }

    /// Interval length for relative triggers
    pub fn period(&self) -> Option<Duration> {
        match self {
            TriggerRule::FixedInterval { period, .. } => Some(*period),
            TriggerRule::RepeatingInterval { period_minutes, .. } => {
                Some(Duration::from_secs(u64::from(*period_minutes) * 60))
            }
            _ => None,
        }
    }

    /// Time-of-day gate for relative triggers
    pub fn window(&self) -> Option<HourWindow> {
        match self {
            TriggerRule::FixedInterval { window, .. }
            | TriggerRule::RepeatingInterval { window, .. } => *window,
            _ => None,
        }
    }

    /// Check the trigger's fields
    pub fn validate(&self) -> Result<(), String> {
        match self {
            TriggerRule::FixedTime { hour, minute } => {
                check_hour(*hour)?;
                check_minute(*minute)
            }
            TriggerRule::FixedInterval { period, window } => {
                if period.is_zero() {
                    return Err("interval period must be positive".to_string());
                }
                check_period(*period)?;
                window.as_ref().map_or(Ok(()), HourWindow::validate)
            }
            TriggerRule::BusinessHoursPeriodic {
                days,
                hours,
                minutes,
            } => {
                if days.is_empty() || hours.is_empty() || minutes.is_empty() {
                    return Err(
                        "business_hours needs at least one day, hour and minute".to_string(),
                    );
                }
                hours.iter().try_for_each(|h| check_hour(*h))?;
                minutes.iter().try_for_each(|m| check_minute(*m))
            }
            TriggerRule::RepeatingInterval {
                period_minutes,
                window,
            } => {
                if *period_minutes == 0 {
                    return Err("period_minutes must be positive".to_string());
                }
                check_period(Duration::from_secs(u64::from(*period_minutes) * 60))?;
                window.as_ref().map_or(Ok(()), HourWindow::validate)
            }
        }
    }
}

fn check_period(period: Duration) -> Result<(), String> {
    if period > MAX_INTERVAL {
        return Err(format!(
            "interval period {} exceeds the maximum of {}",
            humantime::format_duration(period),
            humantime::format_duration(MAX_INTERVAL)
        ));
    }
    Ok(())
}

fn check_hour(hour: u32) -> Result<(), String> {
    if hour > 23 {
        return Err(format!("hour {hour} out of range 0-23"));
    }
    Ok(())
}

fn check_minute(minute: u32) -> Result<(), String> {
    if minute > 59 {
        return Err(format!("minute {minute} out of range 0-59"));
    }
    Ok(())
}

/// Predicate over a sampled rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertCondition {
    /// Always holds
    #[default]
    Unconditional,
    /// Holds while the rate is strictly below `limit`
    BelowThreshold {
        /// Exclusive upper limit
        limit: Decimal,
    },
    /// Holds while `low <= rate <= high`
    WithinBand {
        /// Inclusive lower bound
        low: Decimal,
        /// Inclusive upper bound
        high: Decimal,
    },
}

impl AlertCondition {
    /// Check if a value satisfies this condition
    pub fn holds(&self, value: Decimal) -> bool {
        match self {
            AlertCondition::Unconditional => true,
            AlertCondition::BelowThreshold { limit } => value < *limit,
            AlertCondition::WithinBand { low, high } => *low <= value && value <= *high,
        }
    }

    /// Check the condition's bounds
    pub fn validate(&self) -> Result<(), String> {
        match self {
            AlertCondition::Unconditional => Ok(()),
            AlertCondition::BelowThreshold { limit } => {
                if limit.is_sign_negative() || limit.is_zero() {
                    return Err(format!("threshold limit {limit} must be positive"));
                }
                Ok(())
            }
            AlertCondition::WithinBand { low, high } => {
                if low.is_sign_negative() || low.is_zero() {
                    return Err(format!("band low {low} must be positive"));
                }
                if low > high {
                    return Err(format!("band low {low} is above high {high}"));
                }
                Ok(())
            }
        }
    }
}

/// A configured rule: when to sample, what to check, where to send
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRule {
    /// Unique rule name
    pub name: String,

    /// When the rule is evaluated
    pub trigger: TriggerRule,

    /// What the sample must satisfy to notify
    #[serde(default)]
    pub condition: AlertCondition,

    /// Delivery channel
    #[serde(default)]
    pub channel: Channel,

    /// Template overriding the default message for the condition
    #[serde(default)]
    pub message: Option<String>,

    /// Stay silent while the condition keeps holding after a notification
    #[serde(default)]
    pub suppress_repeats: bool,
}

impl AlertRule {
    /// Create an unconditional direct-push rule
    pub fn new(name: impl Into<String>, trigger: TriggerRule) -> Self {
        Self {
            name: name.into(),
            trigger,
            condition: AlertCondition::Unconditional,
            channel: Channel::Direct,
            message: None,
            suppress_repeats: false,
        }
    }

    /// Set the alert condition
    #[must_use]
    pub fn with_condition(mut self, condition: AlertCondition) -> Self {
        self.condition = condition;
        self
    }

    /// Set the delivery channel
    #[must_use]
    pub fn with_channel(mut self, channel: Channel) -> Self {
        self.channel = channel;
        self
    }

    /// Enable repeat suppression
    #[must_use]
    pub fn suppressing_repeats(mut self) -> Self {
        self.suppress_repeats = true;
        self
    }

    fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("rule name must not be empty".to_string());
        }
        self.trigger
            .validate()
            .and_then(|()| self.condition.validate())
            .map_err(|e| format!("rule '{}': {e}", self.name))
    }
}

/// The validated, immutable list of rules the scheduler runs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlertRuleSet {
    rules: Vec<AlertRule>,
}

impl AlertRuleSet {
    /// Validate and wrap a list of rules
    pub fn new(rules: Vec<AlertRule>) -> Result<Self, String> {
        let set = Self { rules };
        set.validate()?;
        Ok(set)
    }

    /// Check every rule and that names are unique
    pub fn validate(&self) -> Result<(), String> {
        if self.rules.is_empty() {
            return Err("at least one schedule rule is required".to_string());
        }
        let mut seen = HashSet::new();
        for rule in &self.rules {
            rule.validate()?;
            if !seen.insert(rule.name.as_str()) {
                return Err(format!("duplicate rule name '{}'", rule.name));
            }
        }
        Ok(())
    }

    /// Iterate over rules in configuration order
    pub fn iter(&self) -> std::slice::Iter<'_, AlertRule> {
        self.rules.iter()
    }

    /// Number of rules
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl<'a> IntoIterator for &'a AlertRuleSet {
    type Item = &'a AlertRule;
    type IntoIter = std::slice::Iter<'a, AlertRule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}

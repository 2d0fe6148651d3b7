//! # RateWatch
//!
//! Exchange-rate monitoring with chat notifications.
//!
//! RateWatch samples a USD/TWD rate feed on configured schedules, evaluates
//! each sample against the rule that fired, and pushes a notification when
//! the rule's condition holds. A small webhook gateway answers on-demand
//! rate queries and relays page-feed posts.
//!
//! ## Architecture
//!
//! - **Rate**: one HTTP fetch per cycle, rounded and validated
//! - **Schedule**: one timer per rule, wall-clock and interval triggers
//! - **Alerting**: condition evaluation and notification dispatch
//! - **API**: webhook endpoints for chat queries and feed relay
//!
//! ## Quick Start
//!
//! ```bash
//! # Check the provider
//! ratewatch --config config/ratewatch.toml check
//!
//! # Run the scheduler and webhook server
//! ratewatch --config config/ratewatch.toml serve
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod alerting;
pub mod api;
pub mod config;
pub mod error;
pub mod inbound;
pub mod models;
pub mod rate;
pub mod schedule;
pub mod service;

#[cfg(test)]
pub(crate) mod testkit;

pub use config::Config;
pub use error::{Error, Result};
pub use service::RateWatch;

/// Re-exports for convenience
pub mod prelude {
    pub use crate::alerting::{AlertEvaluator, MessagingTransport, NotificationDispatcher};
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::models::*;
    pub use crate::rate::{FetchError, RateSource};
    pub use crate::schedule::{ScheduleEngine, ScheduleZone};
    pub use crate::service::RateWatch;
}

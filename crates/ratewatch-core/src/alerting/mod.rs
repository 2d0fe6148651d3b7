//! Alerting for RateWatch
//!
//! Provides threshold and band evaluation over rate samples and notification
//! delivery to direct and broadcast channels.

mod evaluator;
mod notifier;

pub use evaluator::{render, AlertEvaluator, RepeatGate};
pub use notifier::{
    DeliveryError, LineTransport, LogTransport, MessagingTransport, NotificationDispatcher,
};

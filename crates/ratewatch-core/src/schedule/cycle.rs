//! One evaluation cycle: fetch, evaluate, dispatch

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::alerting::{AlertEvaluator, NotificationDispatcher, RepeatGate};
use crate::models::AlertRule;
use crate::rate::RateSource;

/// How a cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Provider failed; nothing evaluated
    FetchFailed,
    /// Condition did not hold
    Quiet,
    /// Condition held but a previous notification is still standing
    Suppressed,
    /// Notification sent
    Delivered,
    /// Notification dropped by the transport
    DeliveryFailed,
}

/// Runs cycles for any rule; holds no per-rule state
pub struct CycleRunner {
    source: Arc<dyn RateSource>,
    evaluator: AlertEvaluator,
    dispatcher: Arc<NotificationDispatcher>,
}

impl CycleRunner {
    /// Create a runner
    pub fn new(
        source: Arc<dyn RateSource>,
        evaluator: AlertEvaluator,
        dispatcher: Arc<NotificationDispatcher>,
    ) -> Self {
        Self {
            source,
            evaluator,
            dispatcher,
        }
    }

    /// Run one cycle for `rule`.
    ///
    /// Every call performs its own fetch. Failures are logged here and
    /// reported through the outcome; nothing propagates to the timer.
    pub async fn run(&self, rule: &AlertRule, gate: &Mutex<RepeatGate>) -> CycleOutcome {
        let sample = match self.source.fetch().await {
            Ok(sample) => sample,
            Err(e) => {
                warn!(rule = %rule.name, error = %e, "Rate fetch failed, skipping cycle");
                return CycleOutcome::FetchFailed;
            }
        };

        let message = self.evaluator.evaluate_rule(rule, &sample);
        let admitted = gate.lock().admit(message.is_some());

        let Some(message) = message else {
            debug!(rule = %rule.name, rate = %sample.value(), "Condition not met");
            return CycleOutcome::Quiet;
        };

        if !admitted {
            debug!(rule = %rule.name, rate = %sample.value(), "Repeat notification suppressed");
            return CycleOutcome::Suppressed;
        }

        info!(
            rule = %rule.name,
            rate = %sample.value(),
            channel = %message.channel,
            "Alert triggered"
        );

        if self.dispatcher.deliver(&message).await {
            CycleOutcome::Delivered
        } else {
            CycleOutcome::DeliveryFailed
        }
    }
}

//! Alert rule evaluation

use tracing::debug;

use crate::config::MessageTemplates;
use crate::models::{AlertCondition, AlertRule, NotificationMessage, RateSample};

/// Turns a sample and a condition into an optional notification
#[derive(Debug, Clone, Default)]
pub struct AlertEvaluator {
    templates: MessageTemplates,
}

impl AlertEvaluator {
    /// Create an evaluator rendering with the given templates
    pub fn new(templates: MessageTemplates) -> Self {
        Self { templates }
    }

    /// Evaluate a condition against a sample.
    ///
    /// Returns a direct-push message rendered from the default template for
    /// the condition, or `None` when the condition does not hold.
    pub fn evaluate(
        &self,
        condition: &AlertCondition,
        sample: &RateSample,
    ) -> Option<NotificationMessage> {
        self.render_if_holds(condition, sample, self.default_template(condition))
    }

    /// Evaluate a configured rule, honouring its channel and template override
    pub fn evaluate_rule(
        &self,
        rule: &AlertRule,
        sample: &RateSample,
    ) -> Option<NotificationMessage> {
        let template = rule
            .message
            .as_deref()
            .unwrap_or_else(|| self.default_template(&rule.condition));

        let message = self.render_if_holds(&rule.condition, sample, template)?;

        debug!(rule = %rule.name, rate = %sample.value(), "Condition holds");
        Some(message.on(rule.channel))
    }

    fn render_if_holds(
        &self,
        condition: &AlertCondition,
        sample: &RateSample,
        template: &str,
    ) -> Option<NotificationMessage> {
        if !condition.holds(sample.value()) {
            return None;
        }
        Some(NotificationMessage::direct(format_alert_message(
            template, condition, sample,
        )))
    }

    fn default_template(&self, condition: &AlertCondition) -> &str {
        match condition {
            AlertCondition::Unconditional => &self.templates.scheduled,
            AlertCondition::BelowThreshold { .. } => &self.templates.below_threshold,
            AlertCondition::WithinBand { .. } => &self.templates.within_band,
        }
    }
}

/// Fill `{rate}` and the condition's bounds into a template
fn format_alert_message(template: &str, condition: &AlertCondition, sample: &RateSample) -> String {
    let rate = sample.value().to_string();
    let mut values = vec![("rate", rate)];

    match condition {
        AlertCondition::Unconditional => {}
        AlertCondition::BelowThreshold { limit } => values.push(("limit", limit.to_string())),
        AlertCondition::WithinBand { low, high } => {
            values.push(("low", low.to_string()));
            values.push(("high", high.to_string()));
        }
    }

    render(template, &values)
}

/// Replace each `{key}` in `template` with its value
pub fn render(template: &str, values: &[(&str, String)]) -> String {
    values
        .iter()
        .fold(template.to_string(), |text, (key, value)| {
            text.replace(&format!("{{{key}}}"), value)
        })
}

/// Repeat suppression for one rule.
///
/// With suppression enabled, a rule that has notified stays silent while its
/// condition keeps holding and re-arms once the condition clears. Disabled
/// gates admit every holding cycle.
#[derive(Debug, Clone, Default)]
pub struct RepeatGate {
    enabled: bool,
    notified: bool,
}

impl RepeatGate {
    /// Create a gate
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            notified: false,
        }
    }

    /// Record a cycle's outcome and decide whether it may notify
    pub fn admit(&mut self, holds: bool) -> bool {
        if !holds {
            self.notified = false;
            return false;
        }
        if self.enabled && self.notified {
            return false;
        }
        self.notified = true;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Channel, TriggerRule};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use rstest::rstest;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn sample(value: Decimal) -> RateSample {
        RateSample::new(value)
    }

    fn band() -> AlertCondition {
        AlertCondition::WithinBand {
            low: dec!(28.5),
            high: dec!(28.8),
        }
    }

    fn threshold() -> AlertCondition {
        AlertCondition::BelowThreshold { limit: dec!(29.0) }
    }

    #[rstest]
    #[case(dec!(28.5), true)]
    #[case(dec!(28.8), true)]
    #[case(dec!(28.65), true)]
    #[case(dec!(28.49), false)]
    #[case(dec!(28.4999), false)]
    #[case(dec!(28.8001), false)]
    fn test_band_is_inclusive(#[case] rate: Decimal, #[case] fires: bool) {
        let evaluator = AlertEvaluator::default();
        assert_eq!(evaluator.evaluate(&band(), &sample(rate)).is_some(), fires);
    }

    #[rstest]
    #[case(dec!(28.999), true)]
    #[case(dec!(28.0), true)]
    #[case(dec!(29.0), false)]
    #[case(dec!(29.00), false)]
    #[case(dec!(29.0001), false)]
    fn test_threshold_is_exclusive(#[case] rate: Decimal, #[case] fires: bool) {
        let evaluator = AlertEvaluator::default();
        assert_eq!(evaluator.evaluate(&threshold(), &sample(rate)).is_some(), fires);
    }

    #[test]
    fn test_unconditional_always_fires() {
        let evaluator = AlertEvaluator::default();
        let message = evaluator
            .evaluate(&AlertCondition::Unconditional, &sample(dec!(31.2568)))
            .unwrap();

        assert_eq!(message.text, "📢 USD/TWD rate today: 31.2568");
        assert_eq!(message.channel, Channel::Direct);
    }

    #[test]
    fn test_threshold_message_mentions_limit() {
        let evaluator = AlertEvaluator::default();
        let message = evaluator.evaluate(&threshold(), &sample(dec!(28.91))).unwrap();

        assert_eq!(message.text, "⚠️ USD/TWD fell below 29.0: now 28.91");
    }

    #[test]
    fn test_rule_overrides_template_and_channel() {
        let mut rule = AlertRule::new("band", TriggerRule::FixedTime { hour: 9, minute: 0 })
            .with_condition(band())
            .with_channel(Channel::Broadcast);
        rule.message = Some("rate {rate} in [{low}, {high}]".to_string());

        let message = AlertEvaluator::default()
            .evaluate_rule(&rule, &sample(dec!(28.6)))
            .unwrap();

        assert_eq!(message.text, "rate 28.6 in [28.5, 28.8]");
        assert_eq!(message.channel, Channel::Broadcast);
    }

    #[test]
    fn test_no_suppression_by_default() {
        let mut gate = RepeatGate::new(false);
        assert!(gate.admit(true));
        assert!(gate.admit(true));
        assert!(gate.admit(true));
    }

    #[test]
    fn test_suppression_rearms_after_clear() {
        let mut gate = RepeatGate::new(true);
        assert!(gate.admit(true));
        assert!(!gate.admit(true));
        assert!(!gate.admit(false));
        assert!(gate.admit(true));
    }

    fn rate() -> impl Strategy<Value = Decimal> {
        (1i64..1_000_000).prop_map(|m| Decimal::new(m, 4))
    }

    proptest! {
        #[test]
        fn prop_threshold(r in rate(), limit in rate()) {
            let fired = AlertEvaluator::default()
                .evaluate(&AlertCondition::BelowThreshold { limit }, &sample(r))
                .is_some();
            prop_assert_eq!(fired, r < limit);
        }

        #[test]
        fn prop_band(r in rate(), a in rate(), b in rate()) {
            let (low, high) = if a <= b { (a, b) } else { (b, a) };
            let condition = AlertCondition::WithinBand { low, high };
            let evaluator = AlertEvaluator::default();

            let inside = low <= r && r <= high;
            prop_assert_eq!(evaluator.evaluate(&condition, &sample(r)).is_some(), inside);
            prop_assert!(evaluator.evaluate(&condition, &sample(low)).is_some());
            prop_assert!(evaluator.evaluate(&condition, &sample(high)).is_some());

            let step = Decimal::new(1, 4);
            prop_assert!(evaluator.evaluate(&condition, &sample(low - step)).is_none());
            prop_assert!(evaluator.evaluate(&condition, &sample(high + step)).is_none());
        }
    }
}

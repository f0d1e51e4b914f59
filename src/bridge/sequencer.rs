//! Operator-facing acknowledgment of a resolved decision.
//!
//! Three calls, in order: acknowledge the callback, strip the buttons from
//! the notification message, post a confirmation. The channel has no
//! transactions, so each step runs regardless of earlier failures.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::metrics::BridgeMetrics;
use crate::models::event::Decision;
use crate::notification::{ChannelError, MessageChannel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Acknowledge,
    ClearControls,
    Confirm,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Acknowledge => "acknowledge",
            Step::ClearControls => "clear_controls",
            Step::Confirm => "confirm",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("side effect step {step} failed: {source}")]
pub struct SequencerStepError {
    pub step: Step,
    #[source]
    pub source: ChannelError,
}

pub fn ack_text(action: &str) -> String {
    format!("Action '{}' recorded. Processing...", action)
}

pub fn confirmation_text(actor: &str, action: &str) -> String {
    format!("✅ {} chose the action: {}.", actor, action)
}

#[derive(Clone)]
pub struct SideEffectSequencer {
    channel: Arc<dyn MessageChannel>,
    metrics: BridgeMetrics,
}

impl SideEffectSequencer {
    pub fn new(channel: Arc<dyn MessageChannel>, metrics: BridgeMetrics) -> Self {
        Self { channel, metrics }
    }

    /// Run all steps for the decision on message `key`. Returns the steps
    /// that failed; failures are already logged.
    pub async fn run(&self, key: &str, decision: &Decision) -> Vec<SequencerStepError> {
        let mut failures = Vec::new();

        match decision.event_ref.as_deref() {
            Some(event_ref) => {
                let result = self
                    .channel
                    .acknowledge_event(event_ref, &ack_text(&decision.action))
                    .await;
                self.check(Step::Acknowledge, key, result, &mut failures);
            }
            None => tracing::debug!(key, "decision has no event reference, skipping acknowledge"),
        }

        let result = self.channel.clear_controls(key).await;
        self.check(Step::ClearControls, key, result, &mut failures);

        let result = self
            .channel
            .post_message(&confirmation_text(&decision.actor, &decision.action))
            .await;
        self.check(Step::Confirm, key, result, &mut failures);

        if failures.is_empty() {
            info!(key, action = %decision.action, actor = %decision.actor, "decision acknowledged");
        }
        failures
    }

    fn check(
        &self,
        step: Step,
        key: &str,
        result: Result<(), ChannelError>,
        failures: &mut Vec<SequencerStepError>,
    ) {
        if let Err(source) = result {
            warn!(key, step = %step, error = %source, "acknowledgment step failed");
            self.metrics.record_side_effect_failure(step.as_str());
            failures.push(SequencerStepError { step, source });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::fake::{Call, FakeChannel};

    fn decision() -> Decision {
        Decision {
            action: "approve".into(),
            actor: "@alice".into(),
            event_ref: Some("cb-1".into()),
        }
    }

    #[tokio::test]
    async fn test_runs_steps_in_order() {
        let channel = Arc::new(FakeChannel::new());
        let sequencer = SideEffectSequencer::new(channel.clone(), BridgeMetrics::new());

        let failures = sequencer.run("42", &decision()).await;
        assert!(failures.is_empty());
        assert_eq!(
            channel.side_effects(),
            vec![
                Call::Acknowledge {
                    event_ref: "cb-1".into(),
                    text: "Action 'approve' recorded. Processing...".into(),
                },
                Call::ClearControls {
                    message_id: "42".into()
                },
                Call::Post {
                    text: "✅ @alice chose the action: approve.".into()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_step_does_not_abort_the_rest() {
        let channel = Arc::new(FakeChannel::new());
        channel.fail_step("clear_controls");
        let metrics = BridgeMetrics::new();
        let sequencer = SideEffectSequencer::new(channel.clone(), metrics.clone());

        let failures = sequencer.run("42", &decision()).await;
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].step, Step::ClearControls);
        assert_eq!(channel.side_effects().len(), 3);
        assert!(metrics
            .render()
            .unwrap()
            .contains("approval_bridge_side_effect_failures_total{step=\"clear_controls\"} 1"));
    }

    #[tokio::test]
    async fn test_missing_event_ref_skips_acknowledge() {
        let channel = Arc::new(FakeChannel::new());
        let sequencer = SideEffectSequencer::new(channel.clone(), BridgeMetrics::new());
        let mut d = decision();
        d.event_ref = None;

        sequencer.run("42", &d).await;
        let calls = channel.side_effects();
        assert_eq!(calls.len(), 2);
        assert!(!calls.iter().any(|c| matches!(c, Call::Acknowledge { .. })));
    }
}

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::{info, warn};

use super::registry::CorrelationRegistry;
use super::sequencer::SideEffectSequencer;
use super::BridgeError;
use crate::metrics::BridgeMetrics;
use crate::models::approval::ApprovalOutcome;
use crate::models::event::Decision;

/// Entry point for callers waiting on an operator decision.
#[derive(Clone)]
pub struct ApprovalGateway {
    registry: Arc<CorrelationRegistry>,
    sequencer: SideEffectSequencer,
    metrics: BridgeMetrics,
}

/// Removes the caller's registration when the wait ends for any reason,
/// including the caller's future being dropped mid-wait.
struct Registration<'a> {
    registry: &'a CorrelationRegistry,
    key: &'a str,
    id: u64,
    metrics: &'a BridgeMetrics,
}

impl Registration<'_> {
    fn release(&self) -> bool {
        self.registry.release(self.key, self.id)
    }
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        if self.release() {
            tracing::debug!(key = self.key, "correlation removed before resolution");
        }
        self.metrics.set_pending(self.registry.len());
    }
}

impl ApprovalGateway {
    pub fn new(
        registry: Arc<CorrelationRegistry>,
        sequencer: SideEffectSequencer,
        metrics: BridgeMetrics,
    ) -> Self {
        Self {
            registry,
            sequencer,
            metrics,
        }
    }

    /// Wait up to `timeout` for the operator's decision on message `key`.
    ///
    /// Fails with `DuplicateKey` if another caller is already waiting on
    /// `key`. On resolution the acknowledgment steps run once before the
    /// decision is returned; their failures never change the result.
    pub async fn await_decision(
        &self,
        key: &str,
        timeout: Duration,
    ) -> Result<ApprovalOutcome, BridgeError> {
        let deadline = Instant::now() + timeout;
        let waiter = self.registry.register(key, deadline)?;
        let registration = Registration {
            registry: self.registry.as_ref(),
            key,
            id: waiter.id,
            metrics: &self.metrics,
        };
        self.metrics.set_pending(self.registry.len());
        info!(key, timeout_secs = timeout.as_secs_f64(), "waiting for operator decision");

        let mut rx = waiter.rx;
        let decision = match time::timeout_at(deadline, &mut rx).await {
            Ok(Ok(decision)) => Some(decision),
            // Expired or unregistered by someone else.
            Ok(Err(_)) => None,
            Err(_) => {
                if registration.release() {
                    None
                } else {
                    // The sender was already taken out of the table: it is
                    // either about to deliver or has been dropped.
                    (&mut rx).await.ok()
                }
            }
        };
        drop(registration);

        let outcome = match decision {
            Some(decision) => {
                self.acknowledge(key, &decision).await;
                ApprovalOutcome::Resolved(decision)
            }
            None => {
                info!(key, "no operator decision before deadline");
                ApprovalOutcome::TimedOut
            }
        };
        self.metrics.record_outcome(outcome.label());
        Ok(outcome)
    }

    /// Run the sequencer on its own task so a caller that disconnects now
    /// cannot cut the acknowledgment short.
    async fn acknowledge(&self, key: &str, decision: &Decision) {
        let sequencer = self.sequencer.clone();
        let key = key.to_string();
        let decision = decision.clone();
        let task = tokio::spawn(async move { sequencer.run(&key, &decision).await });

        match task.await {
            Ok(failures) if !failures.is_empty() => {
                warn!(failed_steps = failures.len(), "decision returned with partial acknowledgment");
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "acknowledgment task did not complete"),
        }
    }
}

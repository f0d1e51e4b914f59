//! Correlation bridge between the channel's poll-only event feed and
//! callers waiting for an operator decision.
//!
//! One [`poller::ChannelPoller`] reads the feed for the whole process and
//! resolves entries in the shared [`registry::CorrelationRegistry`]; every
//! caller goes through [`gateway::ApprovalGateway`], which registers, waits
//! and runs the [`sequencer::SideEffectSequencer`] once on resolution.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::jobs;
use crate::metrics::BridgeMetrics;
use crate::models::approval::ApprovalOutcome;
use crate::notification::{ChannelError, MessageChannel};

pub mod cursor;
pub mod gateway;
pub mod poller;
pub mod registry;
pub mod sequencer;

use cursor::EventCursor;
use gateway::ApprovalGateway;
use poller::{ChannelPoller, PollSettings};
use registry::CorrelationRegistry;
use sequencer::SideEffectSequencer;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("a decision for message {0} is already being awaited")]
    DuplicateKey(String),

    #[error("cursor cannot move from {current} to {attempted}")]
    InvalidCursorMove { current: i64, attempted: i64 },

    #[error("fetching channel events failed: {0}")]
    ChannelFetch(#[source] ChannelError),
}

/// Shared state of one bridge: the cursor, the pending table, the channel
/// handle and the metrics. Cheap to clone.
#[derive(Clone)]
pub struct Bridge {
    pub cursor: Arc<EventCursor>,
    pub registry: Arc<CorrelationRegistry>,
    pub channel: Arc<dyn MessageChannel>,
    pub metrics: BridgeMetrics,
}

impl Bridge {
    pub fn new(channel: Arc<dyn MessageChannel>) -> Self {
        Self {
            cursor: Arc::new(EventCursor::new()),
            registry: Arc::new(CorrelationRegistry::new()),
            channel,
            metrics: BridgeMetrics::new(),
        }
    }

    pub fn gateway(&self) -> ApprovalGateway {
        ApprovalGateway::new(
            self.registry.clone(),
            SideEffectSequencer::new(self.channel.clone(), self.metrics.clone()),
            self.metrics.clone(),
        )
    }

    /// Build the poller for this bridge. Run exactly one per bridge.
    pub fn poller(&self, settings: PollSettings) -> ChannelPoller {
        ChannelPoller::new(
            self.channel.clone(),
            self.cursor.clone(),
            self.registry.clone(),
            self.metrics.clone(),
            settings,
        )
    }

    /// Wait for a single decision with a poller that lives only as long as
    /// the wait. The key is registered before the first fetch, so a decision
    /// already queued on the feed is matched rather than dropped.
    pub async fn await_with_own_poller(
        &self,
        key: &str,
        timeout: Duration,
        settings: PollSettings,
    ) -> Result<ApprovalOutcome, BridgeError> {
        let gateway = self.gateway();
        let waiting = gateway.await_decision(key, timeout);
        tokio::pin!(waiting);

        // The first poll of `waiting` registers the key before it suspends.
        let poller = tokio::select! {
            biased;
            outcome = &mut waiting => return outcome,
            _ = std::future::ready(()) => {
                jobs::poller::spawn(self.poller(settings), self.metrics.clone())
            }
        };

        let outcome = waiting.await;
        poller.abort();
        outcome
    }
}

//! Prometheus metrics for the approval bridge.
//!
//! Each [`BridgeMetrics`] owns its own registry so that several bridges (one
//! per test, typically) never collide in the process-global default registry.
//! Served as text on `GET /metrics`.

use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct BridgeMetrics {
    registry: Registry,
    approvals_total: IntCounterVec,
    events_total: IntCounterVec,
    poll_failures_total: IntCounterVec,
    side_effect_failures_total: IntCounterVec,
    pending: IntGauge,
}

impl BridgeMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let approvals_total = IntCounterVec::new(
            Opts::new(
                "approval_bridge_approvals_total",
                "Finished approval waits by outcome",
            ),
            &["outcome"],
        )
        .expect("valid approvals_total metric");

        let events_total = IntCounterVec::new(
            Opts::new(
                "approval_bridge_events_total",
                "Channel events consumed by the poller",
            ),
            &["result"],
        )
        .expect("valid events_total metric");

        let poll_failures_total = IntCounterVec::new(
            Opts::new(
                "approval_bridge_poll_failures_total",
                "Failed poller iterations by kind",
            ),
            &["kind"],
        )
        .expect("valid poll_failures_total metric");

        let side_effect_failures_total = IntCounterVec::new(
            Opts::new(
                "approval_bridge_side_effect_failures_total",
                "Failed acknowledgment steps",
            ),
            &["step"],
        )
        .expect("valid side_effect_failures_total metric");

        let pending = IntGauge::new(
            "approval_bridge_pending_correlations",
            "Correlations currently waiting for an operator decision",
        )
        .expect("valid pending metric");

        for collector in [
            Box::new(approvals_total.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(events_total.clone()),
            Box::new(poll_failures_total.clone()),
            Box::new(side_effect_failures_total.clone()),
            Box::new(pending.clone()),
        ] {
            registry
                .register(collector)
                .expect("metric names are unique within the bridge registry");
        }

        Self {
            registry,
            approvals_total,
            events_total,
            poll_failures_total,
            side_effect_failures_total,
            pending,
        }
    }

    pub fn record_outcome(&self, outcome: &str) {
        self.approvals_total.with_label_values(&[outcome]).inc();
    }

    /// `result` is one of `resolved`, `unmatched` or `stale`.
    pub fn record_event(&self, result: &str) {
        self.events_total.with_label_values(&[result]).inc();
    }

    pub fn record_poll_failure(&self, kind: &str) {
        self.poll_failures_total.with_label_values(&[kind]).inc();
    }

    pub fn record_side_effect_failure(&self, step: &str) {
        self.side_effect_failures_total.with_label_values(&[step]).inc();
    }

    pub fn set_pending(&self, count: usize) {
        self.pending.set(count as i64);
    }

    pub fn outcome_count(&self, outcome: &str) -> u64 {
        self.approvals_total.with_label_values(&[outcome]).get()
    }

    /// Encode every metric in the Prometheus text exposition format.
    pub fn render(&self) -> anyhow::Result<String> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        Ok(String::from_utf8(buf)?)
    }
}

impl Default for BridgeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

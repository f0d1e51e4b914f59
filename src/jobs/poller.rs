//! Background job: the process-wide channel poller.
//!
//! Runs one [`ChannelPoller`] iteration after another for the lifetime of the
//! process. Failures are logged and followed by a fixed back-off; they never
//! end the loop, since every pending and future correlation depends on it.

use tokio::task::JoinHandle;

use crate::bridge::poller::ChannelPoller;
use crate::bridge::BridgeError;
use crate::metrics::BridgeMetrics;

/// Spawn the poller loop. Call this once per bridge at startup.
pub fn spawn(poller: ChannelPoller, metrics: BridgeMetrics) -> JoinHandle<()> {
    tokio::spawn(async move {
        let backoff = poller.settings().backoff;
        tracing::info!(
            batch_limit = poller.settings().batch_limit,
            wait_secs = poller.settings().wait.as_secs(),
            "channel poller started"
        );
        loop {
            match poller.poll_once().await {
                Ok(report) if report.fetched > 0 => {
                    tracing::debug!(
                        fetched = report.fetched,
                        resolved = report.resolved,
                        unmatched = report.unmatched,
                        stale = report.stale,
                        "poll batch applied"
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    let kind = match &e {
                        BridgeError::ChannelFetch(_) => "fetch",
                        BridgeError::InvalidCursorMove { .. } => "cursor",
                        BridgeError::DuplicateKey(_) => "other",
                    };
                    metrics.record_poll_failure(kind);
                    tracing::warn!(error = %e, backoff_ms = backoff.as_millis() as u64, "poll iteration failed");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    })
}

//! Background job: expire correlations whose deadline has passed.
//!
//! Waiters normally clean up after themselves; this only catches entries
//! left behind by a waiter that never got to run its cleanup.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::bridge::registry::CorrelationRegistry;

pub fn spawn(registry: Arc<CorrelationRegistry>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = time::interval(every);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let purged = registry.purge_expired(Instant::now());
            if purged > 0 {
                tracing::info!(purged, "expired overdue correlations");
            }
        }
    })
}

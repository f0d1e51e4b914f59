use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::cursor::EventCursor;
use super::registry::CorrelationRegistry;
use super::BridgeError;
use crate::metrics::BridgeMetrics;
use crate::notification::MessageChannel;

#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub batch_limit: u32,
    /// How long the channel may hold a fetch open when idle.
    pub wait: Duration,
    /// Fixed delay after a failed iteration.
    pub backoff: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            batch_limit: 10,
            wait: Duration::from_secs(30),
            backoff: Duration::from_secs(5),
        }
    }
}

/// What one iteration did with its batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollReport {
    pub fetched: usize,
    pub resolved: usize,
    pub unmatched: usize,
    /// Events at or behind the cursor, skipped.
    pub stale: usize,
}

/// Reads the channel feed and resolves pending correlations.
///
/// Exactly one poller runs per bridge; it is the only writer of the cursor.
/// The long-running loop lives in [`crate::jobs::poller`].
pub struct ChannelPoller {
    channel: Arc<dyn MessageChannel>,
    cursor: Arc<EventCursor>,
    registry: Arc<CorrelationRegistry>,
    metrics: BridgeMetrics,
    settings: PollSettings,
}

impl ChannelPoller {
    pub fn new(
        channel: Arc<dyn MessageChannel>,
        cursor: Arc<EventCursor>,
        registry: Arc<CorrelationRegistry>,
        metrics: BridgeMetrics,
        settings: PollSettings,
    ) -> Self {
        Self {
            channel,
            cursor,
            registry,
            metrics,
            settings,
        }
    }

    pub fn settings(&self) -> &PollSettings {
        &self.settings
    }

    /// One iteration: fetch after the cursor, resolve matches in arrival
    /// order, then advance the cursor to the highest id seen.
    ///
    /// A failed fetch leaves the cursor where it was.
    pub async fn poll_once(&self) -> Result<PollReport, BridgeError> {
        let after = self.cursor.current();
        let events = self
            .channel
            .fetch_events(after, self.settings.batch_limit, self.settings.wait)
            .await
            .map_err(BridgeError::ChannelFetch)?;

        let mut report = PollReport {
            fetched: events.len(),
            ..PollReport::default()
        };
        if events.is_empty() {
            return Ok(report);
        }

        let mut highest = after;
        for event in &events {
            if event.id <= after {
                report.stale += 1;
                self.metrics.record_event("stale");
                continue;
            }
            highest = highest.max(event.id);

            let resolved = match event.decision() {
                Some((key, decision)) => {
                    let hit = self.registry.resolve(key, decision);
                    debug!(event_id = event.id, key, hit, "decision event");
                    hit
                }
                None => false,
            };
            if resolved {
                report.resolved += 1;
                self.metrics.record_event("resolved");
            } else {
                report.unmatched += 1;
                self.metrics.record_event("unmatched");
            }
        }

        self.cursor.advance(highest)?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::fake::{callback, plain_message, Call, FakeChannel};
    use tokio::time::Instant;

    fn setup() -> (Arc<FakeChannel>, ChannelPoller, Arc<EventCursor>, Arc<CorrelationRegistry>) {
        let channel = Arc::new(FakeChannel::new());
        let cursor = Arc::new(EventCursor::new());
        let registry = Arc::new(CorrelationRegistry::new());
        let poller = ChannelPoller::new(
            channel.clone(),
            cursor.clone(),
            registry.clone(),
            BridgeMetrics::new(),
            PollSettings {
                wait: Duration::ZERO,
                ..PollSettings::default()
            },
        );
        (channel, poller, cursor, registry)
    }

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    #[tokio::test]
    async fn test_duplicate_events_resolve_once_and_cursor_passes_both() {
        let (channel, poller, cursor, registry) = setup();
        let waiter = registry.register("42", deadline()).unwrap();
        channel.push_batch(vec![
            callback(101, "42", "approve", "@alice"),
            callback(102, "42", "reject", "@mallory"),
        ]);

        let report = poller.poll_once().await.unwrap();
        assert_eq!(report.resolved, 1);
        assert_eq!(report.unmatched, 1);
        assert_eq!(cursor.current(), 102);

        let decision = waiter.rx.await.unwrap();
        assert_eq!(decision.action, "approve");
        assert_eq!(decision.actor, "@alice");
    }

    #[tokio::test]
    async fn test_unmatched_events_still_advance_cursor() {
        let (channel, poller, cursor, _registry) = setup();
        channel.push_batch(vec![plain_message(5), callback(6, "nobody", "approve", "x")]);

        let report = poller.poll_once().await.unwrap();
        assert_eq!(report.unmatched, 2);
        assert_eq!(cursor.current(), 6);

        // Next fetch starts after the highest id.
        poller.poll_once().await.unwrap();
        assert_eq!(channel.calls()[1], Call::Fetch { after: 6 });
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_cursor() {
        let (channel, poller, cursor, _registry) = setup();
        channel.push_batch(vec![plain_message(3)]);
        channel.push_failure();

        poller.poll_once().await.unwrap();
        let err = poller.poll_once().await.unwrap_err();
        assert!(matches!(err, BridgeError::ChannelFetch(_)));
        assert_eq!(cursor.current(), 3);
    }

    #[tokio::test]
    async fn test_empty_batch_does_not_move_cursor() {
        let (_channel, poller, cursor, _registry) = setup();
        let report = poller.poll_once().await.unwrap();
        assert_eq!(report, PollReport::default());
        assert_eq!(cursor.current(), 0);
    }

    #[tokio::test]
    async fn test_stale_batch_is_invalid_cursor_move() {
        let (channel, poller, cursor, registry) = setup();
        cursor.advance(50).unwrap();
        let _waiter = registry.register("42", deadline()).unwrap();
        channel.push_batch(vec![callback(40, "42", "approve", "@alice")]);

        let err = poller.poll_once().await.unwrap_err();
        assert!(matches!(
            err,
            BridgeError::InvalidCursorMove {
                current: 50,
                attempted: 50
            }
        ));
        // Replayed events never resolve anything.
        assert!(registry.contains("42"));
        assert_eq!(cursor.current(), 50);
    }
}

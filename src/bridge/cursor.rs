use std::sync::atomic::{AtomicI64, Ordering};

use super::BridgeError;

/// Position of the last consumed event on the channel feed.
///
/// Written only by the poller, readable from anywhere without locking.
/// Never moves backwards.
#[derive(Debug, Default)]
pub struct EventCursor {
    position: AtomicI64,
}

impl EventCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> i64 {
        self.position.load(Ordering::Acquire)
    }

    /// Move the cursor to `new_position`, which must be strictly greater than
    /// the current position. On failure the cursor is left untouched.
    pub fn advance(&self, new_position: i64) -> Result<(), BridgeError> {
        self.position
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (new_position > current).then_some(new_position)
            })
            .map(|_| ())
            .map_err(|current| BridgeError::InvalidCursorMove {
                current,
                attempted: new_position,
            })
    }
}

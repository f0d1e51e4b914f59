//! Table of pending correlations, keyed by the notification's message id.
//!
//! Each entry holds the sending half of a oneshot channel. Every terminal
//! transition (resolve, expire, unregister) removes the entry under the
//! DashMap shard lock for that key, so a key can reach at most one terminal
//! state and is never resolved twice.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio::time::Instant;

use super::BridgeError;
use crate::models::event::Decision;

struct Pending {
    id: u64,
    deadline: Instant,
    tx: oneshot::Sender<Decision>,
}

/// Receiving side of a registration, owned by the waiting caller.
#[derive(Debug)]
pub struct Waiter {
    pub key: String,
    pub deadline: Instant,
    pub(crate) id: u64,
    pub(crate) rx: oneshot::Receiver<Decision>,
}

#[derive(Default)]
pub struct CorrelationRegistry {
    pending: DashMap<String, Pending>,
    next_id: AtomicU64,
}

impl CorrelationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter for `key`.
    ///
    /// Fails with `DuplicateKey` while another waiter for the same key is
    /// still listening. An entry whose waiter has gone away is replaced.
    pub fn register(&self, key: &str, deadline: Instant) -> Result<Waiter, BridgeError> {
        let (tx, rx) = oneshot::channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let pending = Pending { id, deadline, tx };

        match self.pending.entry(key.to_string()) {
            Entry::Occupied(mut slot) => {
                if !slot.get().tx.is_closed() {
                    return Err(BridgeError::DuplicateKey(key.to_string()));
                }
                tracing::debug!(key, "replacing abandoned correlation");
                slot.insert(pending);
            }
            Entry::Vacant(slot) => {
                slot.insert(pending);
            }
        }

        Ok(Waiter {
            key: key.to_string(),
            deadline,
            id,
            rx,
        })
    }

    /// Hand `decision` to the waiter registered for `key`.
    ///
    /// Returns `true` only if a live waiter existed and was woken. Unknown,
    /// already-terminated and abandoned keys return `false`.
    pub fn resolve(&self, key: &str, decision: Decision) -> bool {
        match self.pending.remove(key) {
            Some((_, pending)) => pending.tx.send(decision).is_ok(),
            None => false,
        }
    }

    /// Terminate `key` as expired. The waiter observes a closed channel.
    pub fn expire(&self, key: &str) -> bool {
        self.pending.remove(key).is_some()
    }

    /// Remove `key` whatever its state.
    pub fn unregister(&self, key: &str) {
        self.pending.remove(key);
    }

    /// Remove the entry only if it still belongs to `waiter`, so a late
    /// cleanup can never evict a newer registration of the same key.
    pub(crate) fn release(&self, key: &str, id: u64) -> bool {
        self.pending.remove_if(key, |_, p| p.id == id).is_some()
    }

    /// Expire every entry whose deadline is at or before `now`.
    pub fn purge_expired(&self, now: Instant) -> usize {
        let overdue: Vec<String> = self
            .pending
            .iter()
            .filter(|e| e.deadline <= now)
            .map(|e| e.key().clone())
            .collect();

        overdue
            .iter()
            .filter(|key| {
                self.pending
                    .remove_if(key.as_str(), |_, p| p.deadline <= now)
                    .is_some()
            })
            .count()
    }

    /// Take the entry's sender out of the table without delivering,
    /// reproducing the moment between removal and send inside `resolve`.
    #[cfg(test)]
    pub(crate) fn take_sender(&self, key: &str) -> Option<oneshot::Sender<Decision>> {
        self.pending.remove(key).map(|(_, p)| p.tx)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.pending.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

//! External messaging channel.
//!
//! The bridge only talks to the operator through [`MessageChannel`], so the
//! poller, gateway and sequencer can be driven by a fake in tests and by
//! [`telegram::TelegramClient`] in production.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::event::ExternalEvent;

pub mod telegram;

#[cfg(test)]
pub(crate) mod fake;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("channel api error {code}: {description}")]
    Api { code: i64, description: String },

    #[error("malformed channel response: {0}")]
    Decode(String),

    #[error("invalid message id: {0}")]
    InvalidMessageId(String),
}

impl From<reqwest::Error> for ChannelError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ChannelError::Decode(e.to_string())
        } else {
            ChannelError::Transport(e.to_string())
        }
    }
}

impl From<reqwest_middleware::Error> for ChannelError {
    fn from(e: reqwest_middleware::Error) -> Self {
        match e {
            reqwest_middleware::Error::Reqwest(e) => e.into(),
            reqwest_middleware::Error::Middleware(e) => ChannelError::Transport(e.to_string()),
        }
    }
}

#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Send a notification to the operator. The returned message id is the
    /// correlation key for the operator's later decision.
    async fn send_notification(
        &self,
        text: &str,
        controls: Option<serde_json::Value>,
    ) -> Result<String, ChannelError>;

    /// Fetch up to `limit` events strictly after position `after`, holding the
    /// request open for at most `wait` when nothing is available yet.
    async fn fetch_events(
        &self,
        after: i64,
        limit: u32,
        wait: Duration,
    ) -> Result<Vec<ExternalEvent>, ChannelError>;

    /// Stop the operator-side "processing" indicator for an event.
    async fn acknowledge_event(&self, event_ref: &str, text: &str) -> Result<(), ChannelError>;

    /// Remove interactive controls from a notification.
    async fn clear_controls(&self, message_id: &str) -> Result<(), ChannelError>;

    async fn post_message(&self, text: &str) -> Result<(), ChannelError>;
}

//! In-memory [`MessageChannel`] used by unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use super::{ChannelError, MessageChannel};
use crate::models::event::ExternalEvent;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Fetch { after: i64 },
    Acknowledge { event_ref: String, text: String },
    ClearControls { message_id: String },
    Post { text: String },
}

#[derive(Default)]
pub struct FakeChannel {
    batches: Mutex<VecDeque<Result<Vec<ExternalEvent>, ChannelError>>>,
    calls: Mutex<Vec<Call>>,
    failing_steps: Mutex<Vec<&'static str>>,
}

impl FakeChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_batch(&self, events: Vec<ExternalEvent>) {
        self.batches.lock().unwrap().push_back(Ok(events));
    }

    pub fn push_failure(&self) {
        self.batches
            .lock()
            .unwrap()
            .push_back(Err(ChannelError::Transport("connection reset".into())));
    }

    /// Make one side-effect step ("acknowledge", "clear_controls", "post") fail.
    pub fn fail_step(&self, step: &'static str) {
        self.failing_steps.lock().unwrap().push(step);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn side_effects(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, Call::Fetch { .. }))
            .collect()
    }

    fn record(&self, call: Call, step: &'static str) -> Result<(), ChannelError> {
        self.calls.lock().unwrap().push(call);
        if self.failing_steps.lock().unwrap().contains(&step) {
            return Err(ChannelError::Api {
                code: 400,
                description: format!("{step} rejected"),
            });
        }
        Ok(())
    }
}

pub fn callback(id: i64, key: &str, action: &str, actor: &str) -> ExternalEvent {
    ExternalEvent {
        id,
        correlation_key: Some(key.to_string()),
        event_ref: Some(format!("cb-{id}")),
        actor: Some(actor.to_string()),
        action: Some(action.to_string()),
        timestamp: Utc::now(),
    }
}

pub fn plain_message(id: i64) -> ExternalEvent {
    ExternalEvent {
        id,
        correlation_key: None,
        event_ref: None,
        actor: Some("someone".into()),
        action: None,
        timestamp: Utc::now(),
    }
}

#[async_trait]
impl MessageChannel for FakeChannel {
    async fn send_notification(
        &self,
        _text: &str,
        _controls: Option<serde_json::Value>,
    ) -> Result<String, ChannelError> {
        Ok("42".to_string())
    }

    async fn fetch_events(
        &self,
        after: i64,
        _limit: u32,
        wait: Duration,
    ) -> Result<Vec<ExternalEvent>, ChannelError> {
        self.calls.lock().unwrap().push(Call::Fetch { after });
        let next = self.batches.lock().unwrap().pop_front();
        match next {
            Some(batch) => batch,
            None => {
                tokio::time::sleep(wait).await;
                Ok(Vec::new())
            }
        }
    }

    async fn acknowledge_event(&self, event_ref: &str, text: &str) -> Result<(), ChannelError> {
        self.record(
            Call::Acknowledge {
                event_ref: event_ref.to_string(),
                text: text.to_string(),
            },
            "acknowledge",
        )
    }

    async fn clear_controls(&self, message_id: &str) -> Result<(), ChannelError> {
        self.record(
            Call::ClearControls {
                message_id: message_id.to_string(),
            },
            "clear_controls",
        )
    }

    async fn post_message(&self, text: &str) -> Result<(), ChannelError> {
        self.record(Call::Post { text: text.to_string() }, "post")
    }
}

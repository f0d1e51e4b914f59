//! Telegram Bot API adapter.
//!
//! Notifications go out with `sendMessage`, operator decisions come back as
//! `callback_query` updates on the `getUpdates` long-poll feed.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{ChannelError, MessageChannel};
use crate::config::TelegramSettings;
use crate::models::event::ExternalEvent;

/// Slack on top of the long-poll window before the HTTP request gives up.
const FETCH_GRACE: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct TelegramClient {
    /// Long-poll client. The poller owns retries for fetches.
    http: reqwest::Client,
    /// Side-effect client with a single transient retry.
    calls: ClientWithMiddleware,
    base_url: String,
    chat_id: String,
}

impl TelegramClient {
    pub fn new(settings: &TelegramSettings) -> Result<Self, ChannelError> {
        let http = reqwest::Client::builder()
            .use_rustls_tls()
            .connect_timeout(Duration::from_secs(5))
            .build()?;

        let retry_policy = ExponentialBackoff::builder()
            .retry_bounds(Duration::from_millis(200), Duration::from_secs(2))
            .build_with_max_retries(1);
        let calls = ClientBuilder::new(
            reqwest::Client::builder()
                .use_rustls_tls()
                .timeout(Duration::from_secs(15))
                .build()?,
        )
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .build();

        Ok(Self {
            http,
            calls,
            base_url: format!(
                "{}/bot{}",
                settings.api_base.trim_end_matches('/'),
                settings.bot_token
            ),
            chat_id: settings.chat_id.clone(),
        })
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> Result<T, ChannelError> {
        let resp = self.calls.post(self.url(method)).json(&body).send().await?;
        unwrap_envelope(resp).await
    }
}

/// Telegram wraps every result as `{ok, result, description, error_code}`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<i64>,
}

async fn unwrap_envelope<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ChannelError> {
    let status = resp.status();
    let text = resp.text().await?;
    let envelope: Envelope<T> = serde_json::from_str(&text).map_err(|e| {
        ChannelError::Decode(format!("status={} error={} body={}", status, e, text))
    })?;

    match envelope {
        Envelope {
            ok: true,
            result: Some(result),
            ..
        } => Ok(result),
        Envelope { ok: true, .. } => Err(ChannelError::Decode("ok response without result".into())),
        Envelope {
            error_code,
            description,
            ..
        } => Err(ChannelError::Api {
            code: error_code.unwrap_or_else(|| i64::from(status.as_u16())),
            description: description.unwrap_or_default(),
        }),
    }
}

// ── Wire types ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    id: String,
    from: User,
    message: Option<CallbackMessage>,
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CallbackMessage {
    message_id: i64,
    date: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct User {
    username: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
}

impl User {
    fn display_name(&self) -> String {
        if let Some(username) = &self.username {
            return format!("@{}", username);
        }
        format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or_default(),
            self.last_name.as_deref().unwrap_or_default()
        )
        .trim()
        .to_string()
    }
}

impl From<Update> for ExternalEvent {
    fn from(update: Update) -> Self {
        let Some(cb) = update.callback_query else {
            return ExternalEvent {
                id: update.update_id,
                correlation_key: None,
                event_ref: None,
                actor: None,
                action: None,
                timestamp: Utc::now(),
            };
        };

        let timestamp = cb
            .message
            .as_ref()
            .and_then(|m| m.date)
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .unwrap_or_else(Utc::now);

        ExternalEvent {
            id: update.update_id,
            correlation_key: cb.message.as_ref().map(|m| m.message_id.to_string()),
            event_ref: Some(cb.id),
            actor: Some(cb.from.display_name()),
            action: cb.data.as_deref().and_then(parse_action),
            timestamp,
        }
    }
}

/// Callback data is `<action>:<tag>`; only the action matters here.
fn parse_action(data: &str) -> Option<String> {
    let action = data.split(':').next().unwrap_or_default().trim();
    (!action.is_empty()).then(|| action.to_string())
}

#[derive(Debug, Serialize)]
struct InlineButton<'a> {
    text: &'a str,
    callback_data: String,
}

/// Build an inline keyboard with one row of decision buttons.
/// `buttons` are `(label, action)` pairs; `tag` is appended to each action.
pub fn decision_keyboard(buttons: &[(&str, &str)], tag: &str) -> serde_json::Value {
    let row: Vec<InlineButton<'_>> = buttons
        .iter()
        .map(|&(text, action)| InlineButton {
            text,
            callback_data: format!("{}:{}", action, tag),
        })
        .collect();
    json!({ "inline_keyboard": [row] })
}

#[async_trait]
impl MessageChannel for TelegramClient {
    async fn send_notification(
        &self,
        text: &str,
        controls: Option<serde_json::Value>,
    ) -> Result<String, ChannelError> {
        let mut body = json!({ "chat_id": self.chat_id, "text": text });
        if let Some(markup) = controls {
            body["reply_markup"] = markup;
        }
        let sent: SentMessage = self.call("sendMessage", body).await?;
        tracing::info!(message_id = sent.message_id, "notification sent");
        Ok(sent.message_id.to_string())
    }

    async fn fetch_events(
        &self,
        after: i64,
        limit: u32,
        wait: Duration,
    ) -> Result<Vec<ExternalEvent>, ChannelError> {
        let resp = self
            .http
            .get(self.url("getUpdates"))
            .query(&[
                ("offset", (after + 1).to_string()),
                ("limit", limit.to_string()),
                ("timeout", wait.as_secs().to_string()),
            ])
            .timeout(wait + FETCH_GRACE)
            .send()
            .await?;
        let updates: Vec<Update> = unwrap_envelope(resp).await?;
        Ok(updates.into_iter().map(ExternalEvent::from).collect())
    }

    async fn acknowledge_event(&self, event_ref: &str, text: &str) -> Result<(), ChannelError> {
        let _: bool = self
            .call(
                "answerCallbackQuery",
                json!({ "callback_query_id": event_ref, "text": text, "show_alert": false }),
            )
            .await?;
        Ok(())
    }

    async fn clear_controls(&self, message_id: &str) -> Result<(), ChannelError> {
        let message_id: i64 = message_id
            .parse()
            .map_err(|_| ChannelError::InvalidMessageId(message_id.to_string()))?;
        // Returns the edited Message, or `true` for inline messages.
        let _: serde_json::Value = self
            .call(
                "editMessageReplyMarkup",
                json!({
                    "chat_id": self.chat_id,
                    "message_id": message_id,
                    "reply_markup": { "inline_keyboard": [] },
                }),
            )
            .await?;
        Ok(())
    }

    async fn post_message(&self, text: &str) -> Result<(), ChannelError> {
        let _: SentMessage = self
            .call("sendMessage", json!({ "chat_id": self.chat_id, "text": text }))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> TelegramClient {
        TelegramClient::new(&TelegramSettings {
            bot_token: "TEST".into(),
            chat_id: "1001".into(),
            api_base: server.uri(),
        })
        .unwrap()
    }

    #[test]
    fn test_parse_action_takes_prefix() {
        assert_eq!(parse_action("approve:42").as_deref(), Some("approve"));
        assert_eq!(parse_action("reject").as_deref(), Some("reject"));
        assert_eq!(parse_action(":42"), None);
    }

    #[test]
    fn test_display_name_prefers_username() {
        let user = User {
            username: Some("alice".into()),
            first_name: Some("Alice".into()),
            last_name: None,
        };
        assert_eq!(user.display_name(), "@alice");

        let user = User {
            username: None,
            first_name: Some("Bob".into()),
            last_name: None,
        };
        assert_eq!(user.display_name(), "Bob");
    }

    #[test]
    fn test_decision_keyboard_shape() {
        let kb = decision_keyboard(&[("Approve", "approve"), ("Reject", "reject")], "42");
        assert_eq!(kb["inline_keyboard"][0][0]["callback_data"], "approve:42");
        assert_eq!(kb["inline_keyboard"][0][1]["text"], "Reject");
    }

    #[tokio::test]
    async fn test_fetch_events_maps_updates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/botTEST/getUpdates"))
            .and(query_param("offset", "11"))
            .and(query_param("timeout", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": [
                    { "update_id": 11, "message": { "message_id": 5, "text": "hi" } },
                    {
                        "update_id": 12,
                        "callback_query": {
                            "id": "cbq-9",
                            "from": { "id": 1, "first_name": "Ana", "last_name": "Diaz" },
                            "message": { "message_id": 42, "date": 1700000000 },
                            "data": "approve:42"
                        }
                    }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let events = client(&server)
            .fetch_events(10, 10, Duration::ZERO)
            .await
            .unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].id, 11);
        assert!(events[0].decision().is_none());
        assert_eq!(events[1].correlation_key.as_deref(), Some("42"));
        assert_eq!(events[1].event_ref.as_deref(), Some("cbq-9"));
        assert_eq!(events[1].actor.as_deref(), Some("Ana Diaz"));
        assert_eq!(events[1].action.as_deref(), Some("approve"));
        assert_eq!(events[1].timestamp.timestamp(), 1700000000);
    }

    #[tokio::test]
    async fn test_api_error_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/botTEST/getUpdates"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "ok": false,
                "error_code": 409,
                "description": "Conflict: terminated by other getUpdates request"
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .fetch_events(0, 10, Duration::ZERO)
            .await
            .unwrap_err();
        match err {
            ChannelError::Api { code, description } => {
                assert_eq!(code, 409);
                assert!(description.contains("Conflict"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_send_notification_returns_message_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTEST/sendMessage"))
            .and(body_partial_json(json!({ "chat_id": "1001", "text": "Pay?" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": { "message_id": 77, "date": 1700000000 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let id = client(&server)
            .send_notification("Pay?", Some(decision_keyboard(&[("Yes", "approve")], "x")))
            .await
            .unwrap();
        assert_eq!(id, "77");
    }

    #[tokio::test]
    async fn test_clear_controls_rejects_non_numeric_id() {
        let server = MockServer::start().await;
        let err = client(&server).clear_controls("abc").await.unwrap_err();
        assert!(matches!(err, ChannelError::InvalidMessageId(_)));
    }

    #[tokio::test]
    async fn test_clear_controls_sends_empty_keyboard() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTEST/editMessageReplyMarkup"))
            .and(body_partial_json(json!({
                "message_id": 42,
                "reply_markup": { "inline_keyboard": [] }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": { "message_id": 42 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        client(&server).clear_controls("42").await.unwrap();
    }
}

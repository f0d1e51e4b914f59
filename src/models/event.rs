use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One unit read from the external channel's event feed.
///
/// Only events that carry a correlation key and an action can resolve a
/// pending correlation; everything else still moves the cursor forward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalEvent {
    /// Feed position of this event. Strictly increasing on a healthy feed.
    pub id: i64,
    /// Identifier of the notification the event refers to, if any.
    pub correlation_key: Option<String>,
    /// Channel-side handle used to acknowledge the event (callback query id).
    pub event_ref: Option<String>,
    pub actor: Option<String>,
    pub action: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ExternalEvent {
    /// Split the event into the key it targets and the decision it carries.
    /// Returns `None` for events that are not operator decisions.
    pub fn decision(&self) -> Option<(&str, Decision)> {
        let key = self.correlation_key.as_deref()?;
        let action = self.action.clone()?;
        Some((
            key,
            Decision {
                action,
                actor: self.actor.clone().unwrap_or_else(|| "unknown".to_string()),
                event_ref: self.event_ref.clone(),
            },
        ))
    }
}

/// The operator's answer to a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub action: String,
    pub actor: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_ref: Option<String>,
}

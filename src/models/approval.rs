use serde::{Deserialize, Serialize};

use super::event::Decision;

/// How a single `await_decision` call ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalOutcome {
    Resolved(Decision),
    TimedOut,
}

impl ApprovalOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ApprovalOutcome::Resolved(_) => "resolved",
            ApprovalOutcome::TimedOut => "timeout",
        }
    }
}

/// Body returned to the HTTP caller once the operator has decided.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApprovalResponse {
    pub action: String,
    pub actor: String,
}

impl From<Decision> for ApprovalResponse {
    fn from(d: Decision) -> Self {
        Self {
            action: d.action,
            actor: d.actor,
        }
    }
}

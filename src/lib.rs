//! Approval bridge — library crate shared by the binary and integration tests.
//!
//! Correlates operator decisions arriving on the Telegram update feed with
//! HTTP callers waiting on them. See [`bridge`] for the core.

use std::sync::Arc;

pub mod api;
pub mod bridge;
pub mod config;
pub mod errors;
pub mod jobs;
pub mod metrics;
pub mod models;
pub mod notification;

/// Shared application state passed to handlers.
pub struct AppState {
    pub bridge: bridge::Bridge,
    pub gateway: bridge::gateway::ApprovalGateway,
    pub config: config::Config,
}

impl AppState {
    pub fn new(bridge: bridge::Bridge, config: config::Config) -> Arc<Self> {
        Arc::new(Self {
            gateway: bridge.gateway(),
            bridge,
            config,
        })
    }
}

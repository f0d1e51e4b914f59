use std::time::Duration;

use serde::Deserialize;

use crate::bridge::poller::PollSettings;

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramSettings {
    pub bot_token: String,
    pub chat_id: String,
    /// Base URL of the Bot API. Overridable for tests and self-hosted API servers.
    pub api_base: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    pub telegram: TelegramSettings,
    /// Fixed wait applied by the HTTP approval endpoint.
    /// Set via APPROVAL_TIMEOUT_SECS. Default: 60.
    pub approval_timeout_secs: u64,
    /// Long-poll window handed to getUpdates. Default: 30.
    pub poll_wait_secs: u64,
    pub poll_batch_limit: u32,
    /// Delay after a failed poll iteration. Default: 5000.
    pub poll_backoff_ms: u64,
    pub sweep_interval_secs: u64,
    /// Browser origin allowed by CORS. Unset = permissive.
    pub cors_allowed_origin: Option<String>,
}

impl Config {
    pub fn approval_timeout(&self) -> Duration {
        Duration::from_secs(self.approval_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            batch_limit: self.poll_batch_limit.clamp(1, 100),
            wait: Duration::from_secs(self.poll_wait_secs),
            backoff: Duration::from_millis(self.poll_backoff_ms),
        }
    }

    /// Build a config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| -> anyhow::Result<String> {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| anyhow::anyhow!("{} must be set", name))
        };
        let number = |name: &str, default: u64| -> u64 {
            lookup(name)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default)
        };

        Ok(Config {
            port: lookup("PORT")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(3000),
            telegram: TelegramSettings {
                bot_token: required("TELEGRAM_BOT_TOKEN")?,
                chat_id: required("TELEGRAM_CHAT_ID")?,
                api_base: lookup("TELEGRAM_API_BASE")
                    .unwrap_or_else(|| "https://api.telegram.org".into()),
            },
            approval_timeout_secs: number("APPROVAL_TIMEOUT_SECS", 60),
            poll_wait_secs: number("POLL_WAIT_SECS", 30),
            poll_batch_limit: number("POLL_BATCH_LIMIT", 10) as u32,
            poll_backoff_ms: number("POLL_BACKOFF_MS", 5000),
            sweep_interval_secs: number("SWEEP_INTERVAL_SECS", 30),
            cors_allowed_origin: lookup("CORS_ALLOWED_ORIGIN").filter(|v| !v.trim().is_empty()),
        })
    }
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();
    Config::from_lookup(|name| std::env::var(name).ok())
}

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::ConfigError;

const DEFAULT_GRAPH_API_BASE: &str = "https://graph.facebook.com/v21.0";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_MESSAGE_INTERVAL_MS: u64 = 2000;

/// Runtime settings, read from the environment (and `.env` through dotenvy).
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub page_access_token: String,
    pub verify_token: String,
    pub graph_api_base: String,
    /// Sender identity attached to plain text replies and persona switches.
    pub persona_id: Option<String>,
    /// Gap between consecutive messages of one reply sequence.
    pub message_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let required = |key: &'static str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(key))
        };

        let bind_raw = lookup("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_raw.parse().map_err(|_| ConfigError::Invalid {
            key: "BIND_ADDR",
            value: bind_raw.clone(),
        })?;

        let message_interval = match lookup("MESSAGE_INTERVAL_MS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| ConfigError::Invalid {
                    key: "MESSAGE_INTERVAL_MS",
                    value: raw,
                })?,
            None => Duration::from_millis(DEFAULT_MESSAGE_INTERVAL_MS),
        };

        Ok(Config {
            database_url: required("DATABASE_URL")?,
            bind_addr,
            page_access_token: required("PAGE_ACCESS_TOKEN")?,
            verify_token: required("VERIFY_TOKEN")?,
            graph_api_base: lookup("GRAPH_API_BASE")
                .map(|base| base.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_GRAPH_API_BASE.to_string()),
            persona_id: lookup("PERSONA_ID").filter(|v| !v.trim().is_empty()),
            message_interval,
        })
    }
}

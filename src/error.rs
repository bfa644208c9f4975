use thiserror::Error;

/// Errors raised while handling a webhook event or delivering a message.
#[derive(Debug, Error)]
pub enum BotError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("graph api request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("send api rejected the request ({status}): {body}")]
    SendApi { status: u16, body: String },
}

/// Configuration errors surfaced at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

pub type Result<T, E = BotError> = std::result::Result<T, E>;

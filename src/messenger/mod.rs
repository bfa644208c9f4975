// Modules
pub mod client;
pub mod scheduler;
pub mod webhook;

// Re-export the Send API client and the delivery loop
pub use client::MessengerClient;
pub use scheduler::{spawn_delivery_loop, Scheduler};

// Re-export the axum handlers
pub use webhook::{handle_receive_event, handle_verify_webhook, WebhookState};

use std::future::Future;

use crate::bot_logic::models::Envelope;
use crate::error::Result;

/// Outbound side of the platform: posts one envelope to the Send API.
pub trait Transport: Send + Sync {
    fn deliver(&self, envelope: &Envelope) -> impl Future<Output = Result<()>> + Send;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize)]
pub struct ProfileNames {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

/// Looks up the public profile of a first-time sender.
pub trait ProfileSource: Send + Sync {
    fn fetch_names(&self, psid: &str) -> impl Future<Output = Result<ProfileNames>> + Send;
}

// Modules
pub mod postgres;
#[cfg(test)]
pub mod memory;

pub use postgres::PgStore;

use std::future::Future;
use tracing::warn;

use crate::bot_logic::models::{active_in_order, DialogueEntry, PayloadRecord, UserProfile};
use crate::error::Result;

/// Inbound message as kept in the conversation log.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundRecord {
    pub mid: String,
    pub text: String,
    pub attachments: serde_json::Value,
}

/// Content catalog and customer state, as seen by the dispatcher.
///
/// Implementors provide the raw accessors; `fetch_entries` and
/// `persist_state` wrap them with the "never fail" behavior the event
/// pipeline relies on.
pub trait ContentStore: Send + Sync {
    fn load_payload(&self, payload: &str) -> impl Future<Output = Result<Option<PayloadRecord>>> + Send;

    fn save_state(&self, psid: &str, state: &str) -> impl Future<Output = Result<()>> + Send;

    fn load_profile(&self, psid: &str) -> impl Future<Output = Result<Option<UserProfile>>> + Send;

    /// Upserts the customer fields. The state label is written by
    /// `persist_state` only.
    fn save_profile(&self, profile: &UserProfile) -> impl Future<Output = Result<()>> + Send;

    fn save_inbound(&self, psid: &str, record: &InboundRecord) -> impl Future<Output = Result<()>> + Send;

    fn save_question(&self, profile: &UserProfile, question: &str) -> impl Future<Output = Result<()>> + Send;

    /// Creates or refreshes the (psid, subtopic) topic row.
    fn save_topic(&self, profile: &UserProfile) -> impl Future<Output = Result<()>> + Send;

    /// Active entries for `payload`, ascending by `order`. Missing, disabled
    /// and unreadable records all come back empty.
    fn fetch_entries(&self, payload: &str) -> impl Future<Output = Vec<DialogueEntry>> + Send {
        async move {
            match self.load_payload(payload).await {
                Ok(record) => active_sequence(record),
                Err(err) => {
                    warn!(payload, error = %err, "failed to load dialogue payload");
                    Vec::new()
                }
            }
        }
    }

    fn persist_state(&self, psid: &str, state: &str) -> impl Future<Output = ()> + Send {
        async move {
            if let Err(err) = self.save_state(psid, state).await {
                warn!(psid, state, error = %err, "failed to persist chat state");
            }
        }
    }

    fn record_inbound(&self, psid: &str, record: &InboundRecord) -> impl Future<Output = ()> + Send {
        async move {
            if let Err(err) = self.save_inbound(psid, record).await {
                warn!(psid, mid = %record.mid, error = %err, "failed to log inbound message");
            }
        }
    }

    fn touch_topic(&self, profile: &UserProfile) -> impl Future<Output = ()> + Send {
        async move {
            if let Err(err) = self.save_topic(profile).await {
                warn!(psid = %profile.psid, error = %err, "failed to update topic");
            }
        }
    }
}

/// Applies the record-level switch and entry ordering.
pub fn active_sequence(record: Option<PayloadRecord>) -> Vec<DialogueEntry> {
    match record {
        Some(record) if record.is_active => active_in_order(&record.message_sequence)
            .into_iter()
            .cloned()
            .collect(),
        _ => Vec::new(),
    }
}

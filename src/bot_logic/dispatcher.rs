use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::models::{
    Envelope, EventKind, InboundEvent, Outgoing, Recipient, RenderedMessage, Scheduled, Sender, UserProfile,
};
use super::renderer::Renderer;
use super::sequencer::Sequencer;
use super::states::{classify_text, transition, Mutation, TextIntent, UserState, ATTACHMENT, CUSTOM_QUESTION_RECEIVED};
use crate::config::Config;
use crate::database::{ContentStore, InboundRecord};
use crate::error::Result;
use crate::messenger::{ProfileSource, Scheduler};

/// Sequence sent to the one-time token of a recurring notification opt-in.
pub const RECURRING_NOTIFICATION_PAYLOAD: &str = "RN_FOLLOW_UP";
const RECURRING_NOTIFICATION_DELAY: Duration = Duration::from_millis(5000);
const OPTIN_NOTIFICATION_MESSAGES: &str = "notification_messages";

const APOLOGY_TEXT: &str =
    "Sorry, something went wrong on our side. Please try again in a little while.";

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub persona_id: Option<String>,
    pub message_interval: Duration,
}

impl From<&Config> for DispatchSettings {
    fn from(config: &Config) -> Self {
        DispatchSettings {
            persona_id: config.persona_id.clone(),
            message_interval: config.message_interval,
        }
    }
}

/// What an event resolved to before the state machine runs.
#[derive(Debug, Clone, PartialEq)]
struct Resolution {
    payload: String,
    mutations: Vec<Mutation>,
    question: Option<String>,
}

impl Resolution {
    fn payload(payload: impl Into<String>) -> Self {
        Resolution { payload: payload.into(), mutations: Vec::new(), question: None }
    }
}

fn resolve(current: &UserState, kind: &EventKind) -> Option<Resolution> {
    match kind {
        EventKind::QuickReply { payload, .. } => Some(Resolution::payload(payload.as_str())),
        EventKind::Attachment { .. } => Some(Resolution::payload(ATTACHMENT)),
        EventKind::Text { text, greeting_confidence } => match classify_text(current, text, *greeting_confidence) {
            TextIntent::Payload { payload, mutations } => Some(Resolution { payload: payload.to_string(), mutations, question: None }),
            TextIntent::Question(question) => Some(Resolution {
                payload: CUSTOM_QUESTION_RECEIVED.to_string(),
                mutations: Vec::new(),
                question: Some(question),
            }),
            TextIntent::Ignored => None,
        },
        EventKind::Postback { payload, referral_ref, .. } => referral_ref
            .as_ref()
            .or(payload.as_ref())
            .map(|p| Resolution::payload(p.to_uppercase())),
        EventKind::Referral { reference } => Some(Resolution::payload(reference.to_uppercase())),
        EventKind::OptIn { kind, frequency, .. } if kind == OPTIN_NOTIFICATION_MESSAGES => {
            let frequency = frequency.as_deref().unwrap_or_default().to_uppercase();
            Some(Resolution::payload(format!("RN_{frequency}")))
        }
        EventKind::OptIn { .. } => None,
    }
}

/// Schedules `messages` at `offset`, `offset + interval`, `offset + 2 * interval`, …
pub fn pace(recipient: &Recipient, messages: Vec<RenderedMessage>, interval: Duration, offset: Duration) -> Vec<Scheduled> {
    messages
        .into_iter()
        .zip(0u32..)
        .map(|(message, index)| Scheduled {
            envelope: Envelope { recipient: recipient.clone(), outgoing: Outgoing::Message(message) },
            delay: offset + interval * index,
        })
        .collect()
}

/// Event handling: payload resolution, state transition, reply sequencing.
pub struct Dispatcher<S, P> {
    store: S,
    profiles: P,
    sequencer: Sequencer,
    settings: DispatchSettings,
}

impl<S, P> Dispatcher<S, P>
where
    S: ContentStore,
    P: ProfileSource,
{
    pub fn new(store: S, profiles: P, settings: DispatchSettings) -> Self {
        let sequencer = Sequencer::new(Renderer::new(settings.persona_id.clone()));
        Dispatcher { store, profiles, sequencer, settings }
    }

    #[cfg(test)]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Handles one inbound event and returns what to send, with delays.
    /// Failures never escape: they turn into a single apology message.
    pub async fn handle(&self, event: &InboundEvent) -> Vec<Scheduled> {
        match self.try_handle(event).await {
            Ok(batch) => batch,
            Err(err) => {
                error!(sender = event.sender.id(), error = %err, "failed to handle event");
                vec![Scheduled {
                    envelope: Envelope {
                        recipient: event.sender.recipient(),
                        outgoing: Outgoing::Message(RenderedMessage::Text {
                            text: APOLOGY_TEXT.to_string(),
                            persona_id: None,
                        }),
                    },
                    delay: Duration::ZERO,
                }]
            }
        }
    }

    async fn try_handle(&self, event: &InboundEvent) -> Result<Vec<Scheduled>> {
        let mut profile = self.load_profile(&event.sender).await?;

        if let Some(mid) = &event.mid {
            let record = InboundRecord {
                mid: mid.clone(),
                text: event.kind.log_text(),
                attachments: attachments_json(&event.kind),
            };
            self.store.record_inbound(&profile.psid, &record).await;
        }

        let current = UserState::from(profile.state.as_str());
        let Some(resolution) = resolve(&current, &event.kind) else {
            debug!(sender = event.sender.id(), state = %current, "no handler for event");
            self.store.save_profile(&profile).await?;
            return Ok(Vec::new());
        };
        info!(sender = event.sender.id(), payload = %resolution.payload, "received payload");

        for mutation in &resolution.mutations {
            mutation.apply(&mut profile);
        }
        if let Some(question) = &resolution.question {
            self.store.save_question(&profile, question).await?;
        }
        transition(&resolution.payload).apply(&mut profile);

        self.store.save_profile(&profile).await?;
        self.store.persist_state(&profile.psid, &profile.state).await;
        if profile.subtopic.is_some() {
            self.store.touch_topic(&profile).await;
        }

        let recipient = event.sender.recipient();
        let interval = self.settings.message_interval;
        let messages = self.sequencer.build_sequence(&self.store, &resolution.payload, &profile).await;

        let mut batch = Vec::with_capacity(messages.len() + 1);
        if let (EventKind::Postback { .. }, Some(persona_id)) = (&event.kind, &self.settings.persona_id) {
            if !messages.is_empty() {
                batch.push(Scheduled {
                    envelope: Envelope { recipient: recipient.clone(), outgoing: Outgoing::PersonaSwitch(persona_id.clone()) },
                    delay: Duration::ZERO,
                });
            }
        }
        batch.extend(pace(&recipient, messages, interval, Duration::ZERO));

        if let EventKind::OptIn { token: Some(token), .. } = &event.kind {
            let follow_up = self
                .sequencer
                .build_sequence(&self.store, RECURRING_NOTIFICATION_PAYLOAD, &profile)
                .await;
            let token_recipient = Recipient::NotificationToken(token.clone());
            batch.extend(pace(&token_recipient, follow_up, interval, RECURRING_NOTIFICATION_DELAY));
        }

        Ok(batch)
    }

    async fn load_profile(&self, sender: &Sender) -> Result<UserProfile> {
        if let Some(profile) = self.store.load_profile(sender.id()).await? {
            return Ok(profile);
        }

        let names = match sender {
            Sender::Psid(psid) => match self.profiles.fetch_names(psid).await {
                Ok(names) => names,
                Err(err) => {
                    warn!(psid = %psid, error = %err, "profile lookup failed; continuing without a name");
                    Default::default()
                }
            },
            Sender::UserRef(_) => Default::default(),
        };
        let profile = UserProfile::new(sender.id(), &names.first_name, &names.last_name);
        info!(sender = sender.id(), name = %profile.full_name(), "new customer");
        Ok(profile)
    }
}

fn attachments_json(kind: &EventKind) -> serde_json::Value {
    match kind {
        EventKind::Attachment { kinds } => serde_json::json!(kinds),
        _ => serde_json::Value::Null,
    }
}

/// Runs events one at a time, in arrival order, and hands each reply batch to
/// the delivery scheduler.
pub fn spawn_event_loop<S, P>(dispatcher: Dispatcher<S, P>, scheduler: Scheduler) -> (mpsc::UnboundedSender<InboundEvent>, JoinHandle<()>)
where
    S: ContentStore + 'static,
    P: ProfileSource + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<InboundEvent>();
    let handle = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let batch = dispatcher.handle(&event).await;
            debug!(sender = event.sender.id(), messages = batch.len(), "scheduling reply");
            scheduler.schedule(batch);
        }
    });
    (tx, handle)
}

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Per-conversation record for a Messenger user
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserProfile {
    pub psid: String,
    pub first_name: String,
    pub last_name: String,
    pub age_range: Option<String>,
    pub gender: Option<String>,
    pub location: Option<String>,
    pub pill_status: Option<String>,
    pub state: String,
    pub topic: Option<String>,
    pub subtopic: Option<String>,
}

impl UserProfile {
    pub fn new(psid: &str, first_name: &str, last_name: &str) -> Self {
        UserProfile {
            psid: psid.to_string(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            ..Default::default()
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }
}

/// Message kinds a dialogue entry can be authored as.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    SimpleText,
    ButtonPayload,
    Generic,
    QuickReplies,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Items that carry their own position and visibility inside a sequence.
pub trait Sequenced {
    fn order(&self) -> i64;
    fn is_active(&self) -> bool;
}

/// Active items sorted by `order`. The sort is stable, so equal orders keep
/// their authored position.
pub fn active_in_order<T: Sequenced>(items: &[T]) -> Vec<&T> {
    let mut active: Vec<&T> = items.iter().filter(|item| item.is_active()).collect();
    active.sort_by_key(|item| item.order());
    active
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct EntryButton {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub payload: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub order: i64,
    #[serde(default)]
    pub is_active: bool,
}

/// Carousel card or quick-reply choice, depending on the owning entry.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct EntryElement {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub img_url: Option<String>,
    #[serde(default)]
    pub payload: Option<String>,
    #[serde(default)]
    pub buttons: Vec<EntryButton>,
    #[serde(default)]
    pub order: i64,
    #[serde(default)]
    pub is_active: bool,
}

/// One authored content record; renders into at most one message.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct DialogueEntry {
    #[serde(default)]
    pub message_type: MessageType,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub order: i64,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub buttons: Vec<EntryButton>,
    #[serde(default)]
    pub elements: Vec<EntryElement>,
}

impl Sequenced for EntryButton {
    fn order(&self) -> i64 {
        self.order
    }
    fn is_active(&self) -> bool {
        self.is_active
    }
}

impl Sequenced for EntryElement {
    fn order(&self) -> i64 {
        self.order
    }
    fn is_active(&self) -> bool {
        self.is_active
    }
}

impl Sequenced for DialogueEntry {
    fn order(&self) -> i64 {
        self.order
    }
    fn is_active(&self) -> bool {
        self.is_active
    }
}

/// Content catalog record stored under a payload key.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct PayloadRecord {
    pub is_active: bool,
    pub message_sequence: Vec<DialogueEntry>,
}

/// Substitution value for a `{{n}}` placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Text(String),
    Number(i64),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Text(text) => f.write_str(text),
            ParamValue::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Number(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuickReply {
    pub title: String,
    pub payload: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Button {
    Postback { title: String, payload: String },
    WebUrl { title: String, url: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Card {
    pub title: String,
    pub subtitle: String,
    pub image_url: String,
    pub buttons: Vec<Button>,
}

/// Platform-ready message produced by the renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderedMessage {
    Text {
        text: String,
        persona_id: Option<String>,
    },
    QuickReplies {
        text: String,
        replies: Vec<QuickReply>,
    },
    ButtonTemplate {
        text: String,
        buttons: Vec<Button>,
    },
    GenericTemplate {
        cards: Vec<Card>,
    },
}

/// Addressing mode of an outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    Id(String),
    /// Chat plugin visitors are addressed by user reference.
    UserRef(String),
    /// One-time token handed over by a recurring notification opt-in.
    NotificationToken(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    Message(RenderedMessage),
    /// Typing indicator sent under a persona so the following replies are
    /// attributed to it.
    PersonaSwitch(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub recipient: Recipient,
    pub outgoing: Outgoing,
}

/// An envelope together with its delay relative to the end of event handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scheduled {
    pub envelope: Envelope,
    pub delay: Duration,
}

/// Who sent an inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sender {
    Psid(String),
    UserRef(String),
}

impl Sender {
    pub fn id(&self) -> &str {
        match self {
            Sender::Psid(id) | Sender::UserRef(id) => id,
        }
    }

    pub fn recipient(&self) -> Recipient {
        match self {
            Sender::Psid(id) => Recipient::Id(id.clone()),
            Sender::UserRef(id) => Recipient::UserRef(id.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    QuickReply {
        payload: String,
        text: String,
    },
    Attachment {
        kinds: Vec<String>,
    },
    Text {
        text: String,
        greeting_confidence: Option<f64>,
    },
    Postback {
        payload: Option<String>,
        title: Option<String>,
        referral_ref: Option<String>,
    },
    Referral {
        reference: String,
    },
    OptIn {
        kind: String,
        frequency: Option<String>,
        token: Option<String>,
    },
}

impl EventKind {
    /// Text kept in the conversation log for this event.
    pub fn log_text(&self) -> String {
        match self {
            EventKind::QuickReply { text, .. } | EventKind::Text { text, .. } => text.clone(),
            EventKind::Postback { title, .. } => title.clone().unwrap_or_default(),
            EventKind::Referral { reference } => reference.clone(),
            EventKind::Attachment { .. } => "Received attachment".to_string(),
            EventKind::OptIn { .. } => "Received optin".to_string(),
        }
    }
}

/// Webhook event after parsing, ready for the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    pub sender: Sender,
    pub mid: Option<String>,
    pub kind: EventKind,
}

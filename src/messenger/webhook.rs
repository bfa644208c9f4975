use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::bot_logic::models::{EventKind, InboundEvent, Sender};

#[derive(Deserialize)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: String,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: String,
    #[serde(rename = "hub.challenge")]
    pub challenge: String,
}

/// Shared state of the webhook routes.
#[derive(Clone)]
pub struct WebhookState {
    pub verify_token: String,
    pub events: mpsc::UnboundedSender<InboundEvent>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookBody {
    pub object: String,
    #[serde(default)]
    pub entry: Vec<WebhookEntry>,
}

/// Events stay raw here so one malformed event cannot reject its siblings.
#[derive(Debug, Deserialize)]
pub struct WebhookEntry {
    #[serde(default)]
    pub messaging: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SenderField {
    pub id: Option<String>,
    pub user_ref: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MessagingEvent {
    #[serde(default)]
    pub sender: SenderField,
    pub message: Option<MessageField>,
    pub postback: Option<PostbackField>,
    pub referral: Option<ReferralField>,
    pub optin: Option<OptInField>,
}

#[derive(Debug, Deserialize)]
pub struct MessageField {
    pub mid: Option<String>,
    pub text: Option<String>,
    #[serde(default)]
    pub is_echo: bool,
    pub quick_reply: Option<QuickReplyField>,
    pub attachments: Option<Vec<AttachmentField>>,
    pub nlp: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct QuickReplyField {
    pub payload: String,
}

#[derive(Debug, Deserialize)]
pub struct AttachmentField {
    #[serde(rename = "type", default)]
    pub kind: String,
}

#[derive(Debug, Deserialize)]
pub struct PostbackField {
    pub mid: Option<String>,
    pub title: Option<String>,
    pub payload: Option<String>,
    pub referral: Option<ReferralField>,
}

#[derive(Debug, Deserialize)]
pub struct ReferralField {
    #[serde(rename = "ref")]
    pub reference: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OptInField {
    #[serde(rename = "type", default)]
    pub kind: String,
    pub notification_messages_frequency: Option<String>,
    pub notification_messages_token: Option<String>,
}

/// Confidence of the built-in greeting entity, when the platform sent one.
fn greeting_confidence(nlp: Option<&Value>) -> Option<f64> {
    nlp?.get("entities")?.get("greetings")?.get(0)?.get("confidence")?.as_f64()
}

impl MessagingEvent {
    /// Converts the raw event. Echoes of our own messages and events without
    /// a usable sender or body come back as `None`.
    pub fn into_inbound(self) -> Option<InboundEvent> {
        let sender = match (self.sender.id, self.sender.user_ref) {
            (Some(id), _) => Sender::Psid(id),
            (None, Some(user_ref)) => Sender::UserRef(user_ref),
            (None, None) => return None,
        };

        if let Some(message) = self.message {
            if message.is_echo {
                return None;
            }
            let kind = if let Some(quick_reply) = message.quick_reply {
                EventKind::QuickReply {
                    payload: quick_reply.payload,
                    text: message.text.clone().unwrap_or_default(),
                }
            } else if let Some(attachments) = message.attachments {
                EventKind::Attachment { kinds: attachments.into_iter().map(|a| a.kind).collect() }
            } else if let Some(text) = message.text {
                EventKind::Text { text, greeting_confidence: greeting_confidence(message.nlp.as_ref()) }
            } else {
                return None;
            };
            return Some(InboundEvent { sender, mid: message.mid, kind });
        }

        if let Some(postback) = self.postback {
            let referral_ref = postback
                .referral
                .filter(|r| r.kind.as_deref() == Some("OPEN_THREAD"))
                .and_then(|r| r.reference);
            return Some(InboundEvent {
                sender,
                mid: postback.mid,
                kind: EventKind::Postback { payload: postback.payload, title: postback.title, referral_ref },
            });
        }

        if let Some(referral) = self.referral {
            return referral.reference.map(|reference| InboundEvent {
                sender,
                mid: None,
                kind: EventKind::Referral { reference },
            });
        }

        self.optin.map(|optin| InboundEvent {
            sender,
            mid: None,
            kind: EventKind::OptIn {
                kind: optin.kind,
                frequency: optin.notification_messages_frequency,
                token: optin.notification_messages_token,
            },
        })
    }
}

pub fn verify_webhook(params: &VerifyQuery, expected_token: &str) -> Option<String> {
    if params.mode == "subscribe" && params.verify_token == expected_token {
        return Some(params.challenge.clone());
    }
    None
}

/// Flattens a page webhook body into inbound events, dropping what cannot be
/// parsed or handled.
pub fn collect_events(body: WebhookBody) -> Vec<InboundEvent> {
    body.entry
        .into_iter()
        .flat_map(|entry| entry.messaging)
        .filter_map(|raw| {
            let event = match serde_json::from_value::<MessagingEvent>(raw) {
                Ok(event) => event,
                Err(err) => {
                    warn!(error = %err, "skipping malformed webhook event");
                    return None;
                }
            };
            let inbound = event.into_inbound();
            if inbound.is_none() {
                debug!("skipping webhook event without a handler");
            }
            inbound
        })
        .collect()
}

// --- AXUM HANDLERS ---

pub async fn handle_verify_webhook(
    State(state): State<WebhookState>,
    Query(params): Query<VerifyQuery>,
) -> (StatusCode, String) {
    match verify_webhook(&params, &state.verify_token) {
        Some(challenge) => {
            info!("webhook verified");
            (StatusCode::OK, challenge)
        }
        None => (StatusCode::FORBIDDEN, "invalid verify token".to_string()),
    }
}

pub async fn handle_receive_event(
    State(state): State<WebhookState>,
    Json(payload): Json<Value>,
) -> (StatusCode, String) {
    let body: WebhookBody = match serde_json::from_value(payload) {
        Ok(body) => body,
        Err(err) => {
            warn!(error = %err, "malformed webhook body");
            return (StatusCode::OK, "EVENT_RECEIVED".to_string());
        }
    };

    if body.object != "page" {
        return (StatusCode::NOT_FOUND, String::new());
    }

    for event in collect_events(body) {
        if state.events.send(event).is_err() {
            warn!("event loop stopped; dropping webhook event");
            break;
        }
    }
    (StatusCode::OK, "EVENT_RECEIVED".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn events_from(value: Value) -> Vec<InboundEvent> {
        collect_events(serde_json::from_value(value).unwrap())
    }

    fn page(messaging: Value) -> Value {
        json!({ "object": "page", "entry": [{ "id": "1", "time": 1, "messaging": messaging }] })
    }

    #[test]
    fn quick_reply_takes_precedence_over_text() {
        let events = events_from(page(json!([{
            "sender": { "id": "42" },
            "message": { "mid": "m1", "text": "Oo", "quick_reply": { "payload": "PRIVACY_POLICY_AGREE" } }
        }])));
        assert_eq!(
            events,
            vec![InboundEvent {
                sender: Sender::Psid("42".into()),
                mid: Some("m1".into()),
                kind: EventKind::QuickReply { payload: "PRIVACY_POLICY_AGREE".into(), text: "Oo".into() },
            }]
        );
    }

    #[test]
    fn text_carries_greeting_confidence() {
        let events = events_from(page(json!([{
            "sender": { "id": "42" },
            "message": {
                "mid": "m2",
                "text": "hello",
                "nlp": { "entities": { "greetings": [{ "confidence": 0.97, "value": "true" }] } }
            }
        }])));
        assert_eq!(
            events[0].kind,
            EventKind::Text { text: "hello".into(), greeting_confidence: Some(0.97) }
        );
    }

    #[test]
    fn echoes_and_empty_messages_are_dropped() {
        let events = events_from(page(json!([
            { "sender": { "id": "42" }, "message": { "mid": "m3", "text": "bot", "is_echo": true } },
            { "sender": { "id": "42" }, "message": { "mid": "m4" } },
            { "sender": {}, "message": { "mid": "m5", "text": "who" } }
        ])));
        assert!(events.is_empty());
    }

    #[test]
    fn postback_keeps_open_thread_referral_only() {
        let events = events_from(page(json!([
            {
                "sender": { "id": "42" },
                "postback": {
                    "title": "Get Started",
                    "payload": "GET_STARTED",
                    "referral": { "ref": "sh_c_pills", "type": "OPEN_THREAD" }
                }
            },
            {
                "sender": { "user_ref": "ref-9" },
                "postback": { "payload": "MENU_ASK", "referral": { "ref": "ad", "type": "ADS" } }
            }
        ])));
        assert_eq!(
            events[0].kind,
            EventKind::Postback {
                payload: Some("GET_STARTED".into()),
                title: Some("Get Started".into()),
                referral_ref: Some("sh_c_pills".into()),
            }
        );
        assert_eq!(events[1].sender, Sender::UserRef("ref-9".into()));
        assert_eq!(
            events[1].kind,
            EventKind::Postback { payload: Some("MENU_ASK".into()), title: None, referral_ref: None }
        );
    }

    #[test]
    fn referral_and_optin_events() {
        let events = events_from(page(json!([
            { "sender": { "id": "42" }, "referral": { "ref": "menu_ask", "source": "SHORTLINK" } },
            {
                "sender": { "id": "42" },
                "optin": {
                    "type": "notification_messages",
                    "notification_messages_frequency": "daily",
                    "notification_messages_token": "tok-1"
                }
            }
        ])));
        assert_eq!(events[0].kind, EventKind::Referral { reference: "menu_ask".into() });
        assert_eq!(
            events[1].kind,
            EventKind::OptIn {
                kind: "notification_messages".into(),
                frequency: Some("daily".into()),
                token: Some("tok-1".into()),
            }
        );
    }

    #[test]
    fn malformed_event_does_not_drop_its_neighbours() {
        let events = events_from(page(json!([
            { "sender": { "id": "42" }, "referral": { "ref": "menu_ask" } },
            { "sender": { "id": "42" }, "message": { "mid": "m6", "quick_reply": {} } },
            { "sender": { "id": "43" }, "message": { "mid": "m7", "text": "close" } }
        ])));
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EventKind::Referral { reference: "menu_ask".into() });
        assert_eq!(events[1].sender, Sender::Psid("43".into()));
    }

    #[test]
    fn verification_requires_matching_token() {
        let params = VerifyQuery {
            mode: "subscribe".into(),
            verify_token: "secret".into(),
            challenge: "1158201444".into(),
        };
        assert_eq!(verify_webhook(&params, "secret").as_deref(), Some("1158201444"));
        assert_eq!(verify_webhook(&params, "other"), None);
    }

    #[tokio::test]
    async fn receive_handler_forwards_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let state = WebhookState { verify_token: "secret".into(), events: tx };
        let body = page(json!([{ "sender": { "id": "42" }, "referral": { "ref": "menu" } }]));

        let (status, text) = handle_receive_event(State(state.clone()), Json(body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(text, "EVENT_RECEIVED");
        assert_eq!(rx.recv().await.unwrap().kind, EventKind::Referral { reference: "menu".into() });

        let body = page(json!([
            { "sender": { "id": "42" }, "referral": { "ref": "menu" } },
            { "message": { "mid": "m", "quick_reply": {} } }
        ]));
        let (status, _) = handle_receive_event(State(state.clone()), Json(body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(rx.recv().await.unwrap().kind, EventKind::Referral { reference: "menu".into() });

        let (status, _) =
            handle_receive_event(State(state), Json(json!({ "object": "instagram", "entry": [] }))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

use reqwest::Client;
use serde_json::{json, Map, Value};

use super::{ProfileNames, ProfileSource, Transport};
use crate::bot_logic::models::{Button, Card, Envelope, Outgoing, Recipient, RenderedMessage};
use crate::error::{BotError, Result};

/// Graph API client for the Send API and user profile lookups.
#[derive(Clone)]
pub struct MessengerClient {
    http: Client,
    api_base: String,
    access_token: String,
}

impl MessengerClient {
    pub fn new(api_base: &str, access_token: &str) -> Self {
        MessengerClient {
            http: Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
        }
    }
}

impl Transport for MessengerClient {
    async fn deliver(&self, envelope: &Envelope) -> Result<()> {
        let url = format!("{}/me/messages", self.api_base);
        let response = self
            .http
            .post(url)
            .query(&[("access_token", self.access_token.as_str())])
            .json(&request_body(envelope))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BotError::SendApi { status: status.as_u16(), body });
        }
        Ok(())
    }
}

impl ProfileSource for MessengerClient {
    async fn fetch_names(&self, psid: &str) -> Result<ProfileNames> {
        let url = format!("{}/{}", self.api_base, psid);
        let names = self
            .http
            .get(url)
            .query(&[
                ("fields", "first_name,last_name"),
                ("access_token", self.access_token.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json::<ProfileNames>()
            .await?;
        Ok(names)
    }
}

fn recipient_body(recipient: &Recipient) -> Value {
    match recipient {
        Recipient::Id(id) => json!({ "id": id }),
        Recipient::UserRef(user_ref) => json!({ "user_ref": user_ref }),
        Recipient::NotificationToken(token) => json!({ "notification_messages_token": token }),
    }
}

/// Full Send API request body. A persona on a text message moves to the top
/// level of the request, next to the recipient.
pub fn request_body(envelope: &Envelope) -> Value {
    let recipient = recipient_body(&envelope.recipient);
    match &envelope.outgoing {
        Outgoing::PersonaSwitch(persona_id) => json!({
            "recipient": recipient,
            "sender_action": "typing_on",
            "persona_id": persona_id,
        }),
        Outgoing::Message(message) => {
            let mut body = json!({
                "recipient": recipient,
                "message": message_body(message),
            });
            if let RenderedMessage::Text { persona_id: Some(persona_id), .. } = message {
                body["persona_id"] = json!(persona_id);
            }
            body
        }
    }
}

pub fn message_body(message: &RenderedMessage) -> Value {
    match message {
        RenderedMessage::Text { text, .. } => json!({ "text": text }),
        RenderedMessage::QuickReplies { text, replies } => {
            let quick_replies: Vec<Value> = replies
                .iter()
                .map(|r| json!({ "content_type": "text", "title": r.title, "payload": r.payload }))
                .collect();
            json!({ "text": text, "quick_replies": quick_replies })
        }
        RenderedMessage::ButtonTemplate { text, buttons } => json!({
            "attachment": {
                "type": "template",
                "payload": {
                    "template_type": "button",
                    "text": text,
                    "buttons": buttons.iter().map(button_body).collect::<Vec<_>>(),
                }
            }
        }),
        RenderedMessage::GenericTemplate { cards } => json!({
            "attachment": {
                "type": "template",
                "payload": {
                    "template_type": "generic",
                    "image_aspect_ratio": "square",
                    "elements": cards.iter().map(card_body).collect::<Vec<_>>(),
                }
            }
        }),
    }
}

fn button_body(button: &Button) -> Value {
    match button {
        Button::Postback { title, payload } => json!({
            "type": "postback", "title": title, "payload": payload
        }),
        Button::WebUrl { title, url } => json!({
            "type": "web_url", "title": title, "url": url, "messenger_extensions": true
        }),
    }
}

// The platform rejects empty subtitle and image_url fields.
fn card_body(card: &Card) -> Value {
    let mut element = Map::new();
    element.insert("title".into(), json!(card.title));
    if !card.subtitle.is_empty() {
        element.insert("subtitle".into(), json!(card.subtitle));
    }
    if !card.image_url.is_empty() {
        element.insert("image_url".into(), json!(card.image_url));
    }
    if !card.buttons.is_empty() {
        let buttons: Vec<Value> = card.buttons.iter().map(button_body).collect();
        element.insert("buttons".into(), Value::Array(buttons));
    }
    Value::Object(element)
}

use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::models::{
    active_in_order, Button, Card, DialogueEntry, EntryButton, MessageType, ParamValue, QuickReply,
    RenderedMessage,
};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{(\d+)\}\}").expect("valid regex"));

/// Turns dialogue entries into platform messages. Holds no per-call state.
#[derive(Debug, Clone, Default)]
pub struct Renderer {
    persona_id: Option<String>,
}

impl Renderer {
    pub fn new(persona_id: Option<String>) -> Self {
        Renderer { persona_id }
    }

    /// Renders one entry. Entry types the renderer does not know produce
    /// `None`.
    pub fn render(&self, entry: &DialogueEntry, params: &[ParamValue]) -> Option<RenderedMessage> {
        let text = substitute(entry.message.as_deref().unwrap_or_default(), params);

        match entry.message_type {
            MessageType::SimpleText => Some(RenderedMessage::Text {
                text,
                persona_id: self.persona_id.clone(),
            }),
            MessageType::ButtonPayload => Some(RenderedMessage::ButtonTemplate {
                text,
                buttons: render_buttons(&entry.buttons),
            }),
            MessageType::Generic => {
                let cards = active_in_order(&entry.elements)
                    .into_iter()
                    .map(|element| Card {
                        title: element.title.clone(),
                        subtitle: element.subtitle.clone().unwrap_or_default(),
                        image_url: element.img_url.clone().unwrap_or_default(),
                        buttons: render_buttons(&element.buttons),
                    })
                    .collect();
                Some(RenderedMessage::GenericTemplate { cards })
            }
            MessageType::QuickReplies => {
                let replies = active_in_order(&entry.elements)
                    .into_iter()
                    .map(|element| QuickReply {
                        title: element.title.clone(),
                        payload: element.payload.clone().unwrap_or_default(),
                    })
                    .collect();
                Some(RenderedMessage::QuickReplies { text, replies })
            }
            MessageType::Unknown => None,
        }
    }
}

fn render_buttons(buttons: &[EntryButton]) -> Vec<Button> {
    active_in_order(buttons)
        .into_iter()
        .map(|button| match (&button.kind, &button.url) {
            (Some(kind), Some(url)) if kind == "web_url" => Button::WebUrl {
                title: button.title.clone(),
                url: url.clone(),
            },
            _ => Button::Postback {
                title: button.title.clone(),
                payload: button.payload.clone().unwrap_or_default(),
            },
        })
        .collect()
}

/// Fills `{{n}}` placeholders from `params`.
///
/// Literal `\n` escapes become line breaks first, and `" !"` collapses to `"!"`
/// last. Placeholders without a matching parameter are left as written.
pub fn substitute(template: &str, params: &[ParamValue]) -> String {
    let text = template.replace("\\n", "\n");
    let filled = PLACEHOLDER.replace_all(&text, |caps: &Captures<'_>| {
        caps[1]
            .parse::<usize>()
            .ok()
            .and_then(|index| params.get(index))
            .map(ParamValue::to_string)
            .unwrap_or_else(|| caps[0].to_string())
    });
    filled.replace(" !", "!")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot_logic::models::EntryElement;

    fn button(title: &str, payload: &str, order: i64, is_active: bool) -> EntryButton {
        EntryButton {
            title: title.into(),
            payload: Some(payload.into()),
            order,
            is_active,
            ..Default::default()
        }
    }

    fn element(title: &str, payload: &str, order: i64, is_active: bool) -> EntryElement {
        EntryElement {
            title: title.into(),
            payload: Some(payload.into()),
            order,
            is_active,
            ..Default::default()
        }
    }

    fn entry(message_type: MessageType, message: &str) -> DialogueEntry {
        DialogueEntry {
            message_type,
            message: Some(message.into()),
            order: 1,
            is_active: true,
            ..Default::default()
        }
    }

    #[test]
    fn substitution_fills_name_and_collapses_space() {
        assert_eq!(substitute("Salamat, {{0}}!", &["Maria".into()]), "Salamat, Maria!");
        assert_eq!(substitute("Salamat, {{0}} !", &["Maria".into()]), "Salamat, Maria!");
    }

    #[test]
    fn substitution_replaces_every_occurrence_and_escape() {
        let text = substitute("{{0}} {{1}}\\n{{0}}\\nbye", &["a".into(), ParamValue::Number(2)]);
        assert_eq!(text, "a 2\na\nbye");
        assert!(!text.contains("{{"));
    }

    #[test]
    fn missing_parameters_leave_placeholders() {
        assert_eq!(substitute("Hi {{0}}", &[]), "Hi {{0}}");
    }

    #[test]
    fn substituted_values_are_not_expanded_again() {
        let params: [ParamValue; 2] = ["{{1}}".into(), "Cruz".into()];
        assert_eq!(substitute("Hi {{0}} {{1}}", &params), "Hi {{1}} Cruz");
        assert_eq!(substitute("{{2}} and {{1}}", &params), "{{2}} and Cruz");
    }

    #[test]
    fn simple_text_carries_persona() {
        let renderer = Renderer::new(Some("514547546794889".into()));
        let rendered = renderer.render(&entry(MessageType::SimpleText, "Hello {{0}}"), &["sis".into()]);
        assert_eq!(
            rendered,
            Some(RenderedMessage::Text {
                text: "Hello sis".into(),
                persona_id: Some("514547546794889".into()),
            })
        );
    }

    #[test]
    fn button_template_drops_inactive_buttons_and_sorts() {
        let mut e = entry(MessageType::ButtonPayload, "Gusto kong...");
        e.buttons = vec![
            button("SERBISYO", "MENU_SERVICES", 2, true),
            button("HIDDEN", "MENU_HIDDEN", 0, false),
            button("MAGTANONG", "MENU_ASK", 1, true),
        ];
        let Some(RenderedMessage::ButtonTemplate { text, buttons }) = Renderer::default().render(&e, &[]) else {
            panic!("expected a button template");
        };
        assert_eq!(text, "Gusto kong...");
        assert_eq!(
            buttons,
            vec![
                Button::Postback { title: "MAGTANONG".into(), payload: "MENU_ASK".into() },
                Button::Postback { title: "SERBISYO".into(), payload: "MENU_SERVICES".into() },
            ]
        );
    }

    #[test]
    fn web_url_buttons_keep_their_link() {
        let mut e = entry(MessageType::ButtonPayload, "More");
        e.buttons = vec![EntryButton {
            title: "Website".into(),
            url: Some("https://malayaako.ph".into()),
            kind: Some("web_url".into()),
            order: 1,
            is_active: true,
            ..Default::default()
        }];
        let Some(RenderedMessage::ButtonTemplate { buttons, .. }) = Renderer::default().render(&e, &[]) else {
            panic!("expected a button template");
        };
        assert_eq!(
            buttons,
            vec![Button::WebUrl { title: "Website".into(), url: "https://malayaako.ph".into() }]
        );
    }

    #[test]
    fn carousel_filters_cards_and_their_buttons() {
        let mut e = entry(MessageType::Generic, "");
        let mut second = element("SERBISYO", "", 2, true);
        second.img_url = Some("https://img/2.png".into());
        second.buttons = vec![button("Off", "X", 0, false), button("Select", "MENU_SERVICES", 1, true)];
        let mut first = element("MAGTANONG", "", 1, true);
        first.subtitle = Some("Tanong".into());
        first.buttons = vec![button("Select", "MENU_ASK", 1, true)];
        e.elements = vec![second, element("GONE", "", 0, false), first];

        let Some(RenderedMessage::GenericTemplate { cards }) = Renderer::default().render(&e, &[]) else {
            panic!("expected a carousel");
        };
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[0].title, "MAGTANONG");
        assert_eq!(cards[0].subtitle, "Tanong");
        assert_eq!(cards[1].image_url, "https://img/2.png");
        assert_eq!(
            cards[1].buttons,
            vec![Button::Postback { title: "Select".into(), payload: "MENU_SERVICES".into() }]
        );
    }

    #[test]
    fn quick_replies_use_active_elements_in_order() {
        let mut e = entry(MessageType::QuickReplies, "Sang-ayon ka ba dito?");
        e.elements = vec![
            element("Hindi", "PRIVACY_POLICY_DISAGREE", 2, true),
            element("Oo", "PRIVACY_POLICY_AGREE", 1, true),
            element("Siguro", "MAYBE", 3, false),
        ];
        let Some(RenderedMessage::QuickReplies { replies, .. }) = Renderer::default().render(&e, &[]) else {
            panic!("expected quick replies");
        };
        let payloads: Vec<&str> = replies.iter().map(|r| r.payload.as_str()).collect();
        assert_eq!(payloads, vec!["PRIVACY_POLICY_AGREE", "PRIVACY_POLICY_DISAGREE"]);
    }

    #[test]
    fn unknown_type_renders_nothing() {
        assert_eq!(Renderer::default().render(&entry(MessageType::Unknown, "x"), &[]), None);
    }

    #[test]
    fn rendering_is_repeatable() {
        let renderer = Renderer::new(None);
        let e = entry(MessageType::SimpleText, "Hi {{0}} !");
        let params = vec![ParamValue::from("pre")];
        assert_eq!(renderer.render(&e, &params), renderer.render(&e, &params));
    }
}

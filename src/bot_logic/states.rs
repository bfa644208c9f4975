use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

use super::models::UserProfile;

pub const GET_STARTED: &str = "GET_STARTED";
pub const CLOSE: &str = "CLOSE";
pub const ATTACHMENT: &str = "ATTACHMENT";
pub const LOCATION_RECEIVED: &str = "LOCATION_RECEIVED";
pub const CUSTOM_QUESTION: &str = "CUSTOM_QUESTION";
pub const CUSTOM_QUESTION_RECEIVED: &str = "CUSTOM_QUESTION_RECEIVED";

const GREETING_CONFIDENCE: f64 = 0.8;

static GET_STARTED_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bget\s+started\b").expect("valid regex"));
static CLOSE_COMMAND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*close[.!]?\s*$").expect("valid regex"));

/// Conversational state stored on the customer record.
///
/// Besides the sub-flows that expect free text, any payload key can be the
/// current state; those are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserState {
    Start,
    AwaitingLocation,
    CustomQuestion,
    Payload(String),
}

impl fmt::Display for UserState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserState::Start => f.write_str(""),
            UserState::AwaitingLocation => f.write_str("AWAITING_LOCATION"),
            UserState::CustomQuestion => f.write_str(CUSTOM_QUESTION),
            UserState::Payload(payload) => f.write_str(payload),
        }
    }
}

impl From<&str> for UserState {
    fn from(s: &str) -> Self {
        match s {
            "" => UserState::Start,
            "AWAITING_LOCATION" => UserState::AwaitingLocation,
            CUSTOM_QUESTION => UserState::CustomQuestion,
            other => UserState::Payload(other.to_string()),
        }
    }
}

/// Profile field update triggered by a payload or by captured free text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Gender(&'static str),
    AgeRange(&'static str),
    PillStatus(Option<&'static str>),
    Topic(&'static str),
    Subtopic(String),
    Location(String),
    ClearTopic,
}

impl Mutation {
    pub fn apply(&self, profile: &mut UserProfile) {
        match self {
            Mutation::Gender(gender) => profile.gender = Some(gender.to_string()),
            Mutation::AgeRange(age) => profile.age_range = Some(age.to_string()),
            Mutation::PillStatus(status) => profile.pill_status = status.map(str::to_string),
            Mutation::Topic(topic) => {
                profile.topic = Some(topic.to_string());
                profile.subtopic = None;
            }
            Mutation::Subtopic(subtopic) => profile.subtopic = Some(subtopic.clone()),
            Mutation::Location(location) => profile.location = Some(location.clone()),
            Mutation::ClearTopic => {
                profile.topic = None;
                profile.subtopic = None;
            }
        }
    }
}

enum Next {
    Verbatim,
    To(UserState),
}

struct Rule {
    payload: &'static str,
    mutations: &'static [Mutation],
    next: Next,
}

static RULES: &[Rule] = &[
    Rule { payload: GET_STARTED, mutations: &[Mutation::ClearTopic], next: Next::To(UserState::Start) },
    Rule { payload: "GENDER_MALE", mutations: &[Mutation::Gender("male")], next: Next::To(UserState::AwaitingLocation) },
    Rule { payload: "GENDER_FEMALE", mutations: &[Mutation::Gender("female")], next: Next::To(UserState::AwaitingLocation) },
    Rule { payload: "GENDER_NONBINARY", mutations: &[Mutation::Gender("nonbinary")], next: Next::To(UserState::AwaitingLocation) },
    Rule { payload: "GENDER_TRANSGENDER", mutations: &[Mutation::Gender("transgender")], next: Next::To(UserState::AwaitingLocation) },
    Rule { payload: "GENDER_NONE", mutations: &[Mutation::Gender("none")], next: Next::To(UserState::AwaitingLocation) },
    Rule { payload: "AGE_12_BELOW", mutations: &[Mutation::AgeRange("12-")], next: Next::Verbatim },
    Rule { payload: "AGE_13_16", mutations: &[Mutation::AgeRange("13-16")], next: Next::Verbatim },
    Rule { payload: "AGE_17_19", mutations: &[Mutation::AgeRange("17-19")], next: Next::Verbatim },
    Rule { payload: "Q_BREASTFEED_YES", mutations: &[Mutation::PillStatus(Some("PROGESTIN"))], next: Next::Verbatim },
    Rule { payload: "Q_BREASTFEED_NO", mutations: &[Mutation::PillStatus(None)], next: Next::Verbatim },
    Rule { payload: "ASK_SEXUAL_HEALTH", mutations: &[Mutation::Topic("SEXUAL_HEALTH")], next: Next::Verbatim },
    Rule { payload: "ASK_MENTAL_HEALTH", mutations: &[Mutation::Topic("MENTAL_HEALTH")], next: Next::Verbatim },
    Rule { payload: "ASK_GROWING_UP", mutations: &[Mutation::Topic("GROWING_UP")], next: Next::Verbatim },
    Rule { payload: "ASK_RELATIONSHIPS", mutations: &[Mutation::Topic("RELATIONSHIPS")], next: Next::Verbatim },
    Rule { payload: CUSTOM_QUESTION, mutations: &[], next: Next::To(UserState::CustomQuestion) },
    Rule { payload: CUSTOM_QUESTION_RECEIVED, mutations: &[], next: Next::To(UserState::CustomQuestion) },
];

/// Payload prefixes that name a subtopic inside the current topic.
const SUBTOPIC_PREFIXES: &[&str] = &["SH_", "GU_", "MH_", "R_"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub mutations: Vec<Mutation>,
    pub next: UserState,
}

impl Transition {
    pub fn apply(&self, profile: &mut UserProfile) {
        for mutation in &self.mutations {
            mutation.apply(profile);
        }
        profile.state = self.next.to_string();
    }
}

/// Profile updates and next state for a resolved payload key. Keys without a
/// rule become the next state unchanged.
pub fn transition(payload: &str) -> Transition {
    if let Some(rule) = RULES.iter().find(|rule| rule.payload == payload) {
        let next = match &rule.next {
            Next::Verbatim => UserState::from(payload),
            Next::To(state) => state.clone(),
        };
        return Transition { mutations: rule.mutations.to_vec(), next };
    }

    let mut mutations = Vec::new();
    if SUBTOPIC_PREFIXES.iter().any(|prefix| payload.starts_with(prefix)) {
        mutations.push(Mutation::Subtopic(payload.to_string()));
    }
    Transition { mutations, next: UserState::from(payload) }
}

/// How a free-text message was understood.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextIntent {
    /// Continue with this payload, applying the captured mutations first.
    Payload { payload: &'static str, mutations: Vec<Mutation> },
    /// Open question typed while the question sub-flow is waiting for one.
    Question(String),
    /// Nothing expects free text right now.
    Ignored,
}

/// Interprets free text against the current state. Only the greeting and the
/// sub-flows waiting for input react to text.
pub fn classify_text(current: &UserState, text: &str, greeting_confidence: Option<f64>) -> TextIntent {
    let greeted = greeting_confidence.is_some_and(|c| c > GREETING_CONFIDENCE);
    if greeted || GET_STARTED_TEXT.is_match(text) {
        return TextIntent::Payload { payload: GET_STARTED, mutations: Vec::new() };
    }

    match current {
        UserState::AwaitingLocation => {
            let location = text.trim();
            if location.is_empty() {
                return TextIntent::Ignored;
            }
            TextIntent::Payload {
                payload: LOCATION_RECEIVED,
                mutations: vec![Mutation::Location(location.to_string())],
            }
        }
        UserState::CustomQuestion if CLOSE_COMMAND.is_match(text) => {
            TextIntent::Payload { payload: CLOSE, mutations: Vec::new() }
        }
        UserState::CustomQuestion if !text.trim().is_empty() => {
            TextIntent::Question(text.trim().to_string())
        }
        _ => TextIntent::Ignored,
    }
}

//! In-memory store used by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::{ContentStore, InboundRecord};
use crate::bot_logic::models::{PayloadRecord, UserProfile};
use crate::error::{BotError, Result};

#[derive(Debug, Default)]
pub struct MemoryStore {
    payloads: Mutex<HashMap<String, PayloadRecord>>,
    profiles: Mutex<HashMap<String, UserProfile>>,
    states: Mutex<HashMap<String, String>>,
    inbound: Mutex<Vec<(String, InboundRecord)>>,
    questions: Mutex<Vec<(String, String)>>,
    topics: Mutex<Vec<(String, String)>>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn put_payload(&self, key: &str, record: PayloadRecord) {
        self.payloads.lock().unwrap().insert(key.to_string(), record);
    }

    pub fn put_profile(&self, profile: UserProfile) {
        self.states
            .lock()
            .unwrap()
            .insert(profile.psid.clone(), profile.state.clone());
        self.profiles.lock().unwrap().insert(profile.psid.clone(), profile);
    }

    /// Makes every raw accessor fail until switched back.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn profile_of(&self, psid: &str) -> Option<UserProfile> {
        self.profiles.lock().unwrap().get(psid).cloned()
    }

    pub fn state_of(&self, psid: &str) -> Option<String> {
        self.states.lock().unwrap().get(psid).cloned()
    }

    pub fn inbound_log(&self) -> Vec<(String, InboundRecord)> {
        self.inbound.lock().unwrap().clone()
    }

    pub fn questions(&self) -> Vec<(String, String)> {
        self.questions.lock().unwrap().clone()
    }

    pub fn topics(&self) -> Vec<(String, String)> {
        self.topics.lock().unwrap().clone()
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(BotError::Database(sqlx::Error::PoolClosed));
        }
        Ok(())
    }
}

impl ContentStore for MemoryStore {
    async fn load_payload(&self, payload: &str) -> Result<Option<PayloadRecord>> {
        self.check()?;
        Ok(self.payloads.lock().unwrap().get(payload).cloned())
    }

    async fn save_state(&self, psid: &str, state: &str) -> Result<()> {
        self.check()?;
        self.states.lock().unwrap().insert(psid.to_string(), state.to_string());
        Ok(())
    }

    async fn load_profile(&self, psid: &str) -> Result<Option<UserProfile>> {
        self.check()?;
        let state = self.state_of(psid).unwrap_or_default();
        Ok(self.profile_of(psid).map(|mut profile| {
            profile.state = state;
            profile
        }))
    }

    async fn save_profile(&self, profile: &UserProfile) -> Result<()> {
        self.check()?;
        let mut stored = profile.clone();
        stored.state = self.state_of(&profile.psid).unwrap_or_default();
        self.profiles.lock().unwrap().insert(profile.psid.clone(), stored);
        Ok(())
    }

    async fn save_inbound(&self, psid: &str, record: &InboundRecord) -> Result<()> {
        self.check()?;
        self.inbound.lock().unwrap().push((psid.to_string(), record.clone()));
        Ok(())
    }

    async fn save_question(&self, profile: &UserProfile, question: &str) -> Result<()> {
        self.check()?;
        self.questions
            .lock()
            .unwrap()
            .push((profile.psid.clone(), question.to_string()));
        Ok(())
    }

    async fn save_topic(&self, profile: &UserProfile) -> Result<()> {
        self.check()?;
        let mut topics = self.topics.lock().unwrap();
        let subtopic = profile.subtopic.clone().unwrap_or_default();
        if !topics.iter().any(|(psid, s)| *psid == profile.psid && *s == subtopic) {
            topics.push((profile.psid.clone(), subtopic));
        }
        Ok(())
    }
}

use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use super::{ContentStore, InboundRecord};
use crate::bot_logic::models::{DialogueEntry, PayloadRecord, UserProfile};
use crate::error::Result;

/// Postgres-backed content catalog and customer store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }
}

#[derive(sqlx::FromRow)]
struct CustomerRow {
    psid: String,
    first_name: String,
    last_name: String,
    age_range: Option<String>,
    gender: Option<String>,
    location: Option<String>,
    pill_status: Option<String>,
    state: String,
    topic: Option<String>,
    subtopic: Option<String>,
}

impl From<CustomerRow> for UserProfile {
    fn from(row: CustomerRow) -> Self {
        UserProfile {
            psid: row.psid,
            first_name: row.first_name,
            last_name: row.last_name,
            age_range: row.age_range,
            gender: row.gender,
            location: row.location,
            pill_status: row.pill_status,
            state: row.state,
            topic: row.topic,
            subtopic: row.subtopic,
        }
    }
}

impl ContentStore for PgStore {
    async fn load_payload(&self, payload: &str) -> Result<Option<PayloadRecord>> {
        let row = sqlx::query_as::<_, (bool, Json<Vec<DialogueEntry>>)>(
            "SELECT is_active, message_sequence FROM payloads WHERE payload_key = $1",
        )
        .bind(payload)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(is_active, Json(message_sequence))| PayloadRecord {
            is_active,
            message_sequence,
        }))
    }

    async fn save_state(&self, psid: &str, state: &str) -> Result<()> {
        sqlx::query("UPDATE customers SET state = $1, updated_at = NOW() WHERE psid = $2")
            .bind(state)
            .bind(psid)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn load_profile(&self, psid: &str) -> Result<Option<UserProfile>> {
        let row = sqlx::query_as::<_, CustomerRow>(
            "SELECT psid, first_name, last_name, age_range, gender, location, pill_status,
                    state, topic, subtopic
             FROM customers
             WHERE psid = $1",
        )
        .bind(psid)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(UserProfile::from))
    }

    async fn save_profile(&self, profile: &UserProfile) -> Result<()> {
        sqlx::query(
            "INSERT INTO customers
                 (psid, first_name, last_name, age_range, gender, location, pill_status, topic, subtopic)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             ON CONFLICT (psid) DO UPDATE SET
                 age_range = EXCLUDED.age_range,
                 gender = EXCLUDED.gender,
                 location = EXCLUDED.location,
                 pill_status = EXCLUDED.pill_status,
                 topic = EXCLUDED.topic,
                 subtopic = EXCLUDED.subtopic,
                 last_message_at = NOW(),
                 updated_at = NOW()",
        )
        .bind(&profile.psid)
        .bind(&profile.first_name)
        .bind(&profile.last_name)
        .bind(&profile.age_range)
        .bind(&profile.gender)
        .bind(&profile.location)
        .bind(&profile.pill_status)
        .bind(&profile.topic)
        .bind(&profile.subtopic)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_inbound(&self, psid: &str, record: &InboundRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO conversations (mid, psid, sender, message, attachments)
             VALUES ($1, $2, 'user', $3, $4)
             ON CONFLICT (mid) DO NOTHING",
        )
        .bind(&record.mid)
        .bind(psid)
        .bind(&record.text)
        .bind(Json(&record.attachments))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_question(&self, profile: &UserProfile, question: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO questions (question_id, psid, topic, subtopic, question)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(Uuid::new_v4())
        .bind(&profile.psid)
        .bind(&profile.topic)
        .bind(&profile.subtopic)
        .bind(question)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_topic(&self, profile: &UserProfile) -> Result<()> {
        let Some(subtopic) = profile.subtopic.as_deref() else {
            return Ok(());
        };
        sqlx::query(
            "INSERT INTO topics (topic_id, psid, first_name, last_name, topic, subtopic)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (psid, subtopic) DO UPDATE SET updated_at = NOW()",
        )
        .bind(Uuid::new_v4())
        .bind(&profile.psid)
        .bind(&profile.first_name)
        .bind(&profile.last_name)
        .bind(&profile.topic)
        .bind(subtopic)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

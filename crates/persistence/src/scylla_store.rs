//! ScyllaDB-backed store implementations

use async_trait::async_trait;
use scylla::batch::Batch;

use avatar_core::{Message, Role, StoredMessage};

use crate::client::ScyllaClient;
use crate::error::PersistenceError;
use crate::{
    now_ms, SessionRecord, SessionRecordStore, StyleGenerationRecord, StyleGenerationStore,
    TranscriptStore,
};

fn role_to_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

fn role_from_str(s: &str) -> Result<Role, PersistenceError> {
    match s {
        "system" => Ok(Role::System),
        "user" => Ok(Role::User),
        "assistant" => Ok(Role::Assistant),
        other => Err(PersistenceError::Row(format!("unknown role: {}", other))),
    }
}

/// Transcript store on the `transcripts` table.
#[derive(Clone)]
pub struct ScyllaTranscriptStore {
    client: ScyllaClient,
}

impl ScyllaTranscriptStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TranscriptStore for ScyllaTranscriptStore {
    async fn append(
        &self,
        session_id: &str,
        user_key: &str,
        persona_id: &str,
        messages: &[Message],
    ) -> Result<(), PersistenceError> {
        if messages.is_empty() {
            return Ok(());
        }

        // One logged batch per append keeps the batch atomic and the rows
        // ordered by (appended_at_ms, seq).
        let statement = format!(
            "INSERT INTO {}.transcripts \
             (user_key, persona_id, appended_at_ms, session_id, seq, role, content_json) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            self.client.keyspace()
        );

        let appended_at = now_ms();
        let mut batch = Batch::default();
        let mut values = Vec::with_capacity(messages.len());

        for (seq, message) in messages.iter().enumerate() {
            batch.append_statement(statement.as_str());
            let content_json = serde_json::to_string(&message.content)?;
            values.push((
                user_key.to_string(),
                persona_id.to_string(),
                appended_at,
                session_id.to_string(),
                seq as i32,
                role_to_str(message.role).to_string(),
                content_json,
            ));
        }

        self.client.session().batch(&batch, values).await?;

        tracing::debug!(
            session_id = %session_id,
            persona_id = %persona_id,
            count = messages.len(),
            "Transcript appended"
        );
        Ok(())
    }

    async fn history_for(
        &self,
        user_key: &str,
        persona_id: &str,
    ) -> Result<Vec<StoredMessage>, PersistenceError> {
        let query = format!(
            "SELECT role, content_json FROM {}.transcripts \
             WHERE user_key = ? AND persona_id = ?",
            self.client.keyspace()
        );

        let result = self
            .client
            .session()
            .query_unpaged(query, (user_key, persona_id))
            .await?;

        let mut messages = Vec::new();
        let rows = result
            .rows_typed::<(String, String)>()
            .map_err(|e| PersistenceError::Row(e.to_string()))?;
        for row in rows {
            let (role, content_json) = row.map_err(|e| PersistenceError::Row(e.to_string()))?;
            messages.push(StoredMessage {
                role: role_from_str(&role)?,
                content: serde_json::from_str(&content_json)?,
            });
        }
        Ok(messages)
    }
}

/// Style-generation store on the `style_generations` table.
#[derive(Clone)]
pub struct ScyllaStyleGenerationStore {
    client: ScyllaClient,
}

impl ScyllaStyleGenerationStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StyleGenerationStore for ScyllaStyleGenerationStore {
    async fn record(&self, record: StyleGenerationRecord) -> Result<(), PersistenceError> {
        let query = format!(
            "INSERT INTO {}.style_generations \
             (session_id, created_at_ms, persona_id, original_url, generated_url, prompt) \
             VALUES (?, ?, ?, ?, ?, ?)",
            self.client.keyspace()
        );

        self.client
            .session()
            .query_unpaged(
                query,
                (
                    record.session_id,
                    record.created_at_ms,
                    record.persona_id,
                    record.original_url,
                    record.generated_url,
                    record.prompt,
                ),
            )
            .await?;
        Ok(())
    }

    async fn for_session(
        &self,
        session_id: &str,
    ) -> Result<Vec<StyleGenerationRecord>, PersistenceError> {
        let query = format!(
            "SELECT session_id, created_at_ms, persona_id, original_url, generated_url, prompt \
             FROM {}.style_generations WHERE session_id = ?",
            self.client.keyspace()
        );

        let result = self
            .client
            .session()
            .query_unpaged(query, (session_id,))
            .await?;

        let mut records = Vec::new();
        let rows = result
            .rows_typed::<(String, i64, String, String, String, String)>()
            .map_err(|e| PersistenceError::Row(e.to_string()))?;
        for row in rows {
            let (session_id, created_at_ms, persona_id, original_url, generated_url, prompt) =
                row.map_err(|e| PersistenceError::Row(e.to_string()))?;
            records.push(StyleGenerationRecord {
                session_id,
                persona_id,
                original_url,
                generated_url,
                prompt,
                created_at_ms,
            });
        }
        Ok(records)
    }
}

/// Session record store on the `sessions` table.
#[derive(Clone)]
pub struct ScyllaSessionRecordStore {
    client: ScyllaClient,
}

impl ScyllaSessionRecordStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SessionRecordStore for ScyllaSessionRecordStore {
    async fn create(&self, record: &SessionRecord) -> Result<(), PersistenceError> {
        let query = format!(
            "INSERT INTO {}.sessions (session_id, user_id, persona_id, started_at_ms, ended_at_ms) \
             VALUES (?, ?, ?, ?, ?)",
            self.client.keyspace()
        );

        self.client
            .session()
            .query_unpaged(
                query,
                (
                    record.session_id.clone(),
                    record.user_id.clone(),
                    record.persona_id.clone(),
                    record.started_at_ms,
                    record.ended_at_ms,
                ),
            )
            .await?;
        Ok(())
    }

    async fn close(&self, session_id: &str, ended_at_ms: i64) -> Result<(), PersistenceError> {
        let query = format!(
            "UPDATE {}.sessions SET ended_at_ms = ? WHERE session_id = ?",
            self.client.keyspace()
        );

        self.client
            .session()
            .query_unpaged(query, (ended_at_ms, session_id))
            .await?;
        Ok(())
    }
}

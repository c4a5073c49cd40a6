//! In-memory store implementations
//!
//! Development default when persistence is disabled; also backs the test
//! suites.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use avatar_core::{Message, StoredMessage};

use crate::error::PersistenceError;
use crate::{
    SessionRecord, SessionRecordStore, StyleGenerationRecord, StyleGenerationStore, TranscriptStore,
};

/// In-memory transcript store keyed by (user_key, persona_id).
#[derive(Default)]
pub struct MemoryTranscriptStore {
    rows: RwLock<HashMap<(String, String), Vec<StoredMessage>>>,
}

impl MemoryTranscriptStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TranscriptStore for MemoryTranscriptStore {
    async fn append(
        &self,
        _session_id: &str,
        user_key: &str,
        persona_id: &str,
        messages: &[Message],
    ) -> Result<(), PersistenceError> {
        let mut rows = self.rows.write();
        let entry = rows
            .entry((user_key.to_string(), persona_id.to_string()))
            .or_default();
        for message in messages {
            entry.push(StoredMessage::from(message));
        }
        Ok(())
    }

    async fn history_for(
        &self,
        user_key: &str,
        persona_id: &str,
    ) -> Result<Vec<StoredMessage>, PersistenceError> {
        Ok(self
            .rows
            .read()
            .get(&(user_key.to_string(), persona_id.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}

/// In-memory style-generation log.
#[derive(Default)]
pub struct MemoryStyleGenerationStore {
    records: RwLock<Vec<StyleGenerationRecord>>,
}

impl MemoryStyleGenerationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StyleGenerationStore for MemoryStyleGenerationStore {
    async fn record(&self, record: StyleGenerationRecord) -> Result<(), PersistenceError> {
        self.records.write().push(record);
        Ok(())
    }

    async fn for_session(
        &self,
        session_id: &str,
    ) -> Result<Vec<StyleGenerationRecord>, PersistenceError> {
        Ok(self
            .records
            .read()
            .iter()
            .filter(|r| r.session_id == session_id)
            .cloned()
            .collect())
    }
}

/// In-memory session records.
#[derive(Default)]
pub struct MemorySessionRecordStore {
    records: RwLock<HashMap<String, SessionRecord>>,
}

impl MemorySessionRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, session_id: &str) -> Option<SessionRecord> {
        self.records.read().get(session_id).cloned()
    }
}

#[async_trait]
impl SessionRecordStore for MemorySessionRecordStore {
    async fn create(&self, record: &SessionRecord) -> Result<(), PersistenceError> {
        self.records
            .write()
            .insert(record.session_id.clone(), record.clone());
        Ok(())
    }

    async fn close(&self, session_id: &str, ended_at_ms: i64) -> Result<(), PersistenceError> {
        if let Some(record) = self.records.write().get_mut(session_id) {
            record.ended_at_ms = Some(ended_at_ms);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avatar_core::Content;

    #[tokio::test]
    async fn append_then_history_preserves_order() {
        let store = MemoryTranscriptStore::new();
        store
            .append(
                "s1",
                "u1",
                "stylist-1",
                &[
                    Message::user(Content::text("Hello")),
                    Message::assistant("Hi there!"),
                ],
            )
            .await
            .unwrap();
        store
            .append("s2", "u1", "stylist-1", &[Message::user(Content::text("Back again"))])
            .await
            .unwrap();

        let history = store.history_for("u1", "stylist-1").await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].content, serde_json::json!("Hello"));
        assert_eq!(history[2].content, serde_json::json!("Back again"));

        // Last element round-trips the appended assistant/user text.
        let other = store.history_for("u2", "stylist-1").await.unwrap();
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn style_records_filter_by_session() {
        let store = MemoryStyleGenerationStore::new();
        store
            .record(StyleGenerationRecord {
                session_id: "s1".to_string(),
                persona_id: "p1".to_string(),
                original_url: "o".to_string(),
                generated_url: "g".to_string(),
                prompt: "red dress".to_string(),
                created_at_ms: 1,
            })
            .await
            .unwrap();

        assert_eq!(store.for_session("s1").await.unwrap().len(), 1);
        assert!(store.for_session("s2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn session_records_close() {
        let store = MemorySessionRecordStore::new();
        store
            .create(&SessionRecord {
                session_id: "s1".to_string(),
                user_id: None,
                persona_id: "p1".to_string(),
                started_at_ms: 100,
                ended_at_ms: None,
            })
            .await
            .unwrap();
        store.close("s1", 200).await.unwrap();
        assert_eq!(store.get("s1").unwrap().ended_at_ms, Some(200));
    }
}

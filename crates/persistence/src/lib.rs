//! Persistence layer for the persona conversation pipeline
//!
//! Provides durable storage for:
//! - Transcripts (append-only per-session message log, queryable across
//!   sessions by user/persona pair)
//! - Session records (started/ended timestamps)
//! - Style-generation records
//!
//! Every store is a narrow trait with a ScyllaDB implementation and an
//! in-memory implementation; the in-memory variants are the development
//! default and back the test suites.

pub mod client;
pub mod error;
pub mod memory;
pub mod schema;
pub mod scylla_store;

pub use client::{ScyllaClient, ScyllaConfig};
pub use error::PersistenceError;
pub use memory::{MemorySessionRecordStore, MemoryStyleGenerationStore, MemoryTranscriptStore};
pub use scylla_store::{ScyllaSessionRecordStore, ScyllaStyleGenerationStore, ScyllaTranscriptStore};

use async_trait::async_trait;

use avatar_core::{Message, StoredMessage};

/// Append-only per-session message log.
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    /// Append messages atomically; order within the batch is preserved.
    ///
    /// `user_key` is the cross-session history key: the user id when the
    /// session is authenticated, otherwise the session id.
    async fn append(
        &self,
        session_id: &str,
        user_key: &str,
        persona_id: &str,
        messages: &[Message],
    ) -> Result<(), PersistenceError>;

    /// All messages for the (user, persona) pair across every session,
    /// oldest first. Rows may carry legacy content shapes; callers
    /// normalize on read.
    async fn history_for(
        &self,
        user_key: &str,
        persona_id: &str,
    ) -> Result<Vec<StoredMessage>, PersistenceError>;
}

/// One persisted style generation.
#[derive(Debug, Clone, PartialEq)]
pub struct StyleGenerationRecord {
    pub session_id: String,
    pub persona_id: String,
    pub original_url: String,
    pub generated_url: String,
    pub prompt: String,
    pub created_at_ms: i64,
}

/// Style-generation audit log.
#[async_trait]
pub trait StyleGenerationStore: Send + Sync {
    async fn record(&self, record: StyleGenerationRecord) -> Result<(), PersistenceError>;

    async fn for_session(
        &self,
        session_id: &str,
    ) -> Result<Vec<StyleGenerationRecord>, PersistenceError>;
}

/// One session row.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub session_id: String,
    pub user_id: Option<String>,
    pub persona_id: String,
    pub started_at_ms: i64,
    pub ended_at_ms: Option<i64>,
}

/// Session lifecycle records.
#[async_trait]
pub trait SessionRecordStore: Send + Sync {
    async fn create(&self, record: &SessionRecord) -> Result<(), PersistenceError>;

    async fn close(&self, session_id: &str, ended_at_ms: i64) -> Result<(), PersistenceError>;
}

/// Combined persistence layer with all ScyllaDB-backed stores.
pub struct PersistenceLayer {
    pub transcripts: ScyllaTranscriptStore,
    pub style_generations: ScyllaStyleGenerationStore,
    pub sessions: ScyllaSessionRecordStore,
}

/// Connect, ensure the schema, and build all stores.
pub async fn init(config: ScyllaConfig) -> Result<PersistenceLayer, PersistenceError> {
    let client = ScyllaClient::connect(config).await?;
    client.ensure_schema().await?;

    Ok(PersistenceLayer {
        transcripts: ScyllaTranscriptStore::new(client.clone()),
        style_generations: ScyllaStyleGenerationStore::new(client.clone()),
        sessions: ScyllaSessionRecordStore::new(client),
    })
}

/// Current time as Unix epoch milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

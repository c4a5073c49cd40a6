//! ScyllaDB schema creation

use scylla::Session;

use crate::error::PersistenceError;

/// Create the keyspace if it doesn't exist
pub async fn create_keyspace(
    session: &Session,
    keyspace: &str,
    replication_factor: u8,
) -> Result<(), PersistenceError> {
    let query = format!(
        "CREATE KEYSPACE IF NOT EXISTS {} WITH replication = \
         {{'class': 'SimpleStrategy', 'replication_factor': {}}}",
        keyspace, replication_factor
    );

    session
        .query_unpaged(query, &[])
        .await
        .map_err(|e| PersistenceError::Schema(format!("Failed to create keyspace: {}", e)))?;

    Ok(())
}

/// Create all required tables
pub async fn create_tables(session: &Session, keyspace: &str) -> Result<(), PersistenceError> {
    // Transcript rows, partitioned by the cross-session history key.
    // Clustering preserves append order within and across sessions.
    let transcripts_table = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}.transcripts (
            user_key TEXT,
            persona_id TEXT,
            appended_at_ms BIGINT,
            session_id TEXT,
            seq INT,
            role TEXT,
            content_json TEXT,
            PRIMARY KEY ((user_key, persona_id), appended_at_ms, session_id, seq)
        ) WITH CLUSTERING ORDER BY (appended_at_ms ASC, session_id ASC, seq ASC)
    "#,
        keyspace
    );

    session
        .query_unpaged(transcripts_table, &[])
        .await
        .map_err(|e| PersistenceError::Schema(format!("Failed to create transcripts table: {}", e)))?;

    // Session lifecycle rows
    let sessions_table = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}.sessions (
            session_id TEXT,
            user_id TEXT,
            persona_id TEXT,
            started_at_ms BIGINT,
            ended_at_ms BIGINT,
            PRIMARY KEY (session_id)
        )
    "#,
        keyspace
    );

    session
        .query_unpaged(sessions_table, &[])
        .await
        .map_err(|e| PersistenceError::Schema(format!("Failed to create sessions table: {}", e)))?;

    // Style generation audit rows
    let style_table = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}.style_generations (
            session_id TEXT,
            created_at_ms BIGINT,
            persona_id TEXT,
            original_url TEXT,
            generated_url TEXT,
            prompt TEXT,
            PRIMARY KEY ((session_id), created_at_ms)
        ) WITH CLUSTERING ORDER BY (created_at_ms DESC)
    "#,
        keyspace
    );

    session
        .query_unpaged(style_table, &[])
        .await
        .map_err(|e| PersistenceError::Schema(format!("Failed to create style_generations table: {}", e)))?;

    tracing::info!("All tables created successfully");
    Ok(())
}

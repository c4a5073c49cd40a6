//! Persistence errors

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("connection error: {0}")]
    Connection(#[from] scylla::transport::errors::NewSessionError),

    #[error("query error: {0}")]
    Query(#[from] scylla::transport::errors::QueryError),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("row error: {0}")]
    Row(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<PersistenceError> for avatar_core::Error {
    fn from(err: PersistenceError) -> Self {
        avatar_core::Error::TranscriptWrite(err.to_string())
    }
}

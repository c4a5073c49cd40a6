//! Streaming chat-completion client
//!
//! Talks to an OpenAI-compatible `/chat/completions` endpoint with SSE
//! streaming, native tool calling, and image-bearing message content. A
//! second, bounded path serves short secondary generations (interruption
//! replies, celebratory one-liners).

pub mod accumulate;
pub mod client;
pub mod types;

pub use accumulate::{salvage_first_object, ToolCallAccumulator};
pub use client::{ChatBackend, OpenAiChatClient};
pub use types::{
    ChatEvent, ChatOutcome, ChatRequest, FinishReason, ToolDefinition, ToolInvocation,
};

use thiserror::Error;

/// LLM errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("API error: {0}")]
    Api(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("timeout")]
    Timeout,

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<LlmError> for avatar_core::Error {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Timeout => avatar_core::Error::UpstreamTimeout,
            other => avatar_core::Error::Upstream(other.to_string()),
        }
    }
}

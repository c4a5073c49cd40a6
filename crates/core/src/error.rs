//! Shared error taxonomy
//!
//! Turn-level failures map onto a small set of variants. Errors in
//! non-essential write paths (transcript, style log) never fail the
//! user-visible turn; errors in the primary stream terminate the turn and
//! always surface a client event.

use thiserror::Error;

/// Pipeline errors
#[derive(Error, Debug)]
pub enum Error {
    /// The requested persona does not exist in the persona store.
    #[error("persona not found: {0}")]
    PersonaMissing(String),

    /// The LLM stream produced no terminal frame within the turn deadline.
    #[error("upstream timeout")]
    UpstreamTimeout,

    /// An upstream provider (STT, LLM, TTS, image generator) failed.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Malformed data on an upstream stream (e.g. unsalvageable tool-call
    /// arguments).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The turn was cancelled (barge-in or session end). Orderly; no client
    /// error event is emitted for this variant.
    #[error("turn cancelled")]
    Cancelled,

    /// Transcript persistence failed. Logged, never fails the turn.
    #[error("transcript write failed: {0}")]
    TranscriptWrite(String),

    /// Object-storage failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Session lifecycle failure.
    #[error("session error: {0}")]
    Session(String),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for failures that terminate the turn with a visible
    /// `llm_response_error` event.
    pub fn is_turn_fatal(&self) -> bool {
        matches!(
            self,
            Error::PersonaMissing(_) | Error::UpstreamTimeout | Error::Upstream(_)
        )
    }
}

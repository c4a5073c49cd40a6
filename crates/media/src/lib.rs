//! Streaming media plumbing
//!
//! Two halves of the realtime loop:
//! - `stt`: duplex transcription channel with server-side VAD and
//!   speech-while-avatar-speaking detection
//! - `tts`: buffered streaming synthesis relaying audio frames and
//!   per-character alignment to the client

pub mod preprocess;
pub mod stt;
pub mod tts;

pub use preprocess::{ends_at_sentence, preprocess_for_speech, SentenceBuffer};
pub use stt::{SttEvent, Transcriber};
pub use tts::{ElevenLabsStreamer, TtsSink};

use thiserror::Error;

/// Media pipeline errors
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("STT channel error: {0}")]
    Stt(String),

    #[error("TTS error: {0}")]
    Tts(String),

    #[error("websocket error: {0}")]
    WebSocket(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for MediaError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        MediaError::WebSocket(err.to_string())
    }
}

impl From<MediaError> for avatar_core::Error {
    fn from(err: MediaError) -> Self {
        avatar_core::Error::Upstream(err.to_string())
    }
}

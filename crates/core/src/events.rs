//! Client-facing event contract
//!
//! Frames on the duplex channel are JSON envelopes
//! `{"event": <name>, "data": <payload>}`. Event names and payload field
//! spellings are part of the contract and must not change.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::purchase::PurchaseFlowStatus;

/// Why the user interrupted the avatar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptionKind {
    DuringSpeech,
    DuringThinking,
    FalseStart,
    Clarification,
}

/// Style-generation payload discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StyleGenerationKind {
    Feedback,
    Completion,
}

/// Style-generation payload attached to `llm_response_complete`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StyleGenerationPayload {
    #[serde(rename = "type")]
    pub kind: StyleGenerationKind,
    #[serde(rename = "generatingMessageId")]
    pub generating_message_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(rename = "imageUrl", skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A trending product surfaced by the product tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub price: f64,
    #[serde(rename = "imageUrl", skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Outbound events (core → client).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "transcription_partial")]
    TranscriptionPartial { text: String },

    #[serde(rename = "transcription_final")]
    TranscriptionFinal { text: String },

    #[serde(rename = "user_spoke")]
    UserSpoke {
        #[serde(rename = "partialTranscript")]
        partial_transcript: String,
        #[serde(rename = "interruptionType")]
        interruption_type: InterruptionKind,
    },

    #[serde(rename = "llm_response_start")]
    LlmResponseStart {
        #[serde(rename = "avatarId")]
        avatar_id: String,
    },

    #[serde(rename = "llm_response_chunk")]
    LlmResponseChunk {
        content: String,
        #[serde(rename = "avatarId")]
        avatar_id: String,
        complete: bool,
    },

    #[serde(rename = "llm_response_complete")]
    LlmResponseComplete {
        #[serde(rename = "fullResponse")]
        full_response: String,
        #[serde(rename = "avatarId")]
        avatar_id: String,
        complete: bool,
        #[serde(rename = "styleGeneration", skip_serializing_if = "Option::is_none")]
        style_generation: Option<StyleGenerationPayload>,
    },

    #[serde(rename = "llm_response_error")]
    LlmResponseError {
        error: String,
        #[serde(rename = "avatarId")]
        avatar_id: String,
    },

    #[serde(rename = "tts_stream")]
    TtsStream {
        /// Base64-encoded audio frame.
        audio: String,
        #[serde(rename = "avatarId")]
        avatar_id: String,
    },

    #[serde(rename = "tts_stream_alignment")]
    TtsStreamAlignment {
        characters: Vec<String>,
        start_seconds: Vec<f64>,
        end_seconds: Vec<f64>,
        #[serde(rename = "avatarId")]
        avatar_id: String,
    },

    #[serde(rename = "products-display")]
    ProductsDisplay {
        products: Vec<Product>,
        #[serde(rename = "sessionId")]
        session_id: String,
        /// Unix epoch milliseconds.
        timestamp: i64,
    },

    #[serde(rename = "style_suggestion_error")]
    StyleSuggestionError {
        #[serde(rename = "avatarId")]
        avatar_id: String,
        error: String,
    },

    #[serde(rename = "llm-context-update")]
    LlmContextUpdate {
        #[serde(rename = "type")]
        kind: PurchaseFlowStatus,
        guidance: String,
        #[serde(rename = "sessionId")]
        session_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<Map<String, Value>>,
    },
}

/// Inbound events (client → core).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum InboundEvent {
    #[serde(rename = "audio-frame")]
    AudioFrame {
        /// Base64-encoded PCM16 audio.
        audio: String,
    },

    #[serde(rename = "vision-image")]
    VisionImage {
        /// Base64-encoded JPEG.
        image: String,
        /// Client-local capture timestamp (epoch milliseconds); the slot
        /// ages by server receipt time.
        #[serde(default)]
        timestamp: Option<i64>,
    },

    #[serde(rename = "text-message")]
    TextMessage { text: String },

    #[serde(rename = "purchase-status")]
    PurchaseStatus {
        #[serde(rename = "type")]
        status: PurchaseFlowStatus,
        #[serde(default)]
        data: Map<String, Value>,
    },

    #[serde(rename = "end")]
    End,
}

/// Handle for emitting events to one client.
///
/// Wraps the session's bounded outgoing queue. Alignment frames use the
/// lossy path (drop-newest when the client is slow); every other event,
/// audio included, is awaited so per-turn ordering is preserved.
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::Sender<ClientEvent>,
}

impl EventSender {
    pub fn new(tx: mpsc::Sender<ClientEvent>) -> Self {
        Self { tx }
    }

    /// Bounded channel pair sized for one session.
    pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<ClientEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (EventSender::new(tx), rx)
    }

    /// Ordered send. Completes when the event is queued; a closed channel
    /// means the client is gone and the event is dropped silently.
    pub async fn emit(&self, event: ClientEvent) {
        if self.tx.send(event).await.is_err() {
            tracing::debug!("client channel closed, event dropped");
        }
    }

    /// Lossy send for alignment frames: drop the newest frame rather than
    /// stall the LLM stream when the queue is full.
    pub fn emit_lossy(&self, event: ClientEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::trace!("outgoing queue full, alignment frame dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!("client channel closed, alignment frame dropped");
            }
        }
    }
}

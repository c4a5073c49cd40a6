//! Streaming TTS sink
//!
//! The orchestrator writes text chunks into a sink; the streamer buffers
//! them, cuts speakable segments, and drives the synthesizer's
//! with-timestamps streaming endpoint. Audio frames and per-character
//! alignment are relayed straight to the client.
//!
//! Flush errors are logged and swallowed; a failed synthesis never
//! terminates the turn.

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use reqwest::Client;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use avatar_config::TtsSettings;
use avatar_core::{ClientEvent, EventSender, InterruptCoordinator};

use crate::preprocess::{preprocess_for_speech, SentenceBuffer};

/// Per-turn text sink driven by the orchestrator.
#[async_trait]
pub trait TtsSink: Send + Sync {
    /// Append streamed text; may trigger a flush.
    async fn on_chunk(&self, text: &str);

    /// Flush any remainder at end of stream.
    async fn on_complete(&self);
}

/// ElevenLabs-backed streaming sink.
pub struct ElevenLabsStreamer {
    client: Client,
    settings: TtsSettings,
    voice_id: String,
    avatar_id: String,
    events: EventSender,
    coordinator: Arc<InterruptCoordinator>,
    cancel: CancellationToken,
    buffer: Mutex<SentenceBuffer>,
    spoke: AtomicBool,
}

impl ElevenLabsStreamer {
    pub fn new(
        settings: TtsSettings,
        voice_id: Option<&str>,
        avatar_id: impl Into<String>,
        events: EventSender,
        coordinator: Arc<InterruptCoordinator>,
        cancel: CancellationToken,
    ) -> Self {
        let voice_id = voice_id
            .filter(|v| !v.is_empty())
            .unwrap_or(&settings.default_voice_id)
            .to_string();
        let buffer = SentenceBuffer::new(settings.max_buffer_chars);
        Self {
            client: Client::new(),
            settings,
            voice_id,
            avatar_id: avatar_id.into(),
            events,
            coordinator,
            cancel,
            buffer: Mutex::new(buffer),
            spoke: AtomicBool::new(false),
        }
    }

    fn stream_url(&self) -> String {
        format!(
            "{}/v1/text-to-speech/{}/stream/with-timestamps?output_format={}",
            self.settings.endpoint.trim_end_matches('/'),
            self.voice_id,
            self.settings.output_format
        )
    }

    /// Synthesize one segment and relay frames to the client.
    async fn flush(&self, segment: String) {
        if self.cancel.is_cancelled() {
            return;
        }
        let text = preprocess_for_speech(&segment);
        if text.is_empty() {
            return;
        }

        let response = self
            .client
            .post(self.stream_url())
            .header("xi-api-key", &self.settings.api_key)
            .json(&serde_json::json!({
                "text": text,
                "model_id": self.settings.model_id,
            }))
            .send()
            .await;

        let response = match response {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                tracing::warn!(status = %response.status(), "TTS flush rejected, skipping segment");
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "TTS flush failed, skipping segment");
                return;
            }
        };

        let mut stream = response.bytes_stream();
        let mut line_buffer = String::new();

        while let Some(chunk) = stream.next().await {
            // Frames already accepted by the provider keep arriving after a
            // barge-in; suppress them best-effort.
            if self.cancel.is_cancelled() {
                return;
            }
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    tracing::warn!(error = %e, "TTS stream read failed mid-segment");
                    return;
                }
            };
            line_buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(line_end) = line_buffer.find('\n') {
                let line = line_buffer[..line_end].trim().to_string();
                line_buffer = line_buffer[line_end + 1..].to_string();
                if line.is_empty() {
                    continue;
                }
                let Ok(frame) = serde_json::from_str::<TtsStreamLine>(&line) else {
                    continue;
                };
                self.relay_frame(frame).await;
            }
        }

        if let Ok(frame) = serde_json::from_str::<TtsStreamLine>(line_buffer.trim()) {
            if !self.cancel.is_cancelled() {
                self.relay_frame(frame).await;
            }
        }
    }

    async fn relay_frame(&self, frame: TtsStreamLine) {
        if let Some(alignment) = frame.alignment {
            self.events.emit_lossy(ClientEvent::TtsStreamAlignment {
                characters: alignment.characters,
                start_seconds: alignment.character_start_times_seconds,
                end_seconds: alignment.character_end_times_seconds,
                avatar_id: self.avatar_id.clone(),
            });
        }
        if let Some(audio) = frame.audio_base64 {
            if !audio.is_empty() {
                self.events
                    .emit(ClientEvent::TtsStream {
                        audio,
                        avatar_id: self.avatar_id.clone(),
                    })
                    .await;
            }
        }
    }
}

#[async_trait]
impl TtsSink for ElevenLabsStreamer {
    async fn on_chunk(&self, text: &str) {
        if self.cancel.is_cancelled() {
            self.buffer.lock().clear();
            return;
        }
        if !self.spoke.swap(true, Ordering::SeqCst) {
            self.coordinator.mark_speaking();
        }
        let segment = self.buffer.lock().push(text);
        if let Some(segment) = segment {
            self.flush(segment).await;
        }
    }

    async fn on_complete(&self) {
        let segment = self.buffer.lock().finish();
        if let Some(segment) = segment {
            self.flush(segment).await;
        }
    }
}

#[derive(Debug, Deserialize)]
struct TtsStreamLine {
    #[serde(default)]
    audio_base64: Option<String>,
    #[serde(default)]
    alignment: Option<TtsAlignment>,
}

#[derive(Debug, Deserialize)]
struct TtsAlignment {
    characters: Vec<String>,
    character_start_times_seconds: Vec<f64>,
    character_end_times_seconds: Vec<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use avatar_config::TtsSettings;

    fn streamer(cancel: CancellationToken) -> (ElevenLabsStreamer, tokio::sync::mpsc::Receiver<ClientEvent>) {
        let (events, rx) = EventSender::channel(16);
        let coordinator = Arc::new(InterruptCoordinator::new());
        let streamer = ElevenLabsStreamer::new(
            TtsSettings::default(),
            Some("voice-1"),
            "ava",
            events,
            coordinator,
            cancel,
        );
        (streamer, rx)
    }

    #[test]
    fn persona_voice_overrides_default() {
        let cancel = CancellationToken::new();
        let (streamer, _rx) = streamer(cancel);
        assert_eq!(streamer.voice_id, "voice-1");

        let (events, _rx) = EventSender::channel(1);
        let fallback = ElevenLabsStreamer::new(
            TtsSettings::default(),
            None,
            "ava",
            events,
            Arc::new(InterruptCoordinator::new()),
            CancellationToken::new(),
        );
        assert_eq!(fallback.voice_id, TtsSettings::default().default_voice_id);
    }

    #[tokio::test]
    async fn first_chunk_marks_avatar_speaking() {
        let (events, _rx) = EventSender::channel(16);
        let coordinator = Arc::new(InterruptCoordinator::new());
        let cancel = CancellationToken::new();
        let streamer = ElevenLabsStreamer::new(
            TtsSettings::default(),
            None,
            "ava",
            events,
            coordinator.clone(),
            cancel,
        );

        assert!(!coordinator.is_speaking());
        // No sentence boundary, so nothing flushes (and no network I/O).
        streamer.on_chunk("Hello").await;
        assert!(coordinator.is_speaking());
    }

    #[tokio::test]
    async fn cancelled_sink_discards_buffer() {
        let cancel = CancellationToken::new();
        let (streamer, _rx) = streamer(cancel.clone());
        streamer.on_chunk("Some text without boundary").await;
        cancel.cancel();
        streamer.on_chunk("more").await;
        assert!(streamer.buffer.lock().finish().is_none());
    }

    #[test]
    fn frame_line_parses_with_and_without_alignment() {
        let with: TtsStreamLine = serde_json::from_str(
            r#"{"audio_base64":"QUJD","alignment":{"characters":["H","i"],
                "character_start_times_seconds":[0.0,0.1],
                "character_end_times_seconds":[0.1,0.2]}}"#,
        )
        .unwrap();
        assert!(with.alignment.is_some());

        let bare: TtsStreamLine = serde_json::from_str(r#"{"audio_base64":"QUJD"}"#).unwrap();
        assert!(bare.alignment.is_none());
    }
}

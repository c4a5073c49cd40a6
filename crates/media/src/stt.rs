//! Duplex transcription channel
//!
//! Opens a websocket to the streaming STT provider with a fixed session
//! configuration (PCM16 input, server-side VAD, English transcription) and
//! re-emits partials and finals. A non-trivial partial while the avatar is
//! speaking is the barge-in signal: the coordinator atomically clears the
//! speaking flag and cancels the current turn, and a single `BargeIn`
//! event is emitted.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::connect_async;

use avatar_config::SttSettings;
use avatar_core::InterruptCoordinator;

use crate::MediaError;

/// Events surfaced to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum SttEvent {
    /// Accumulated in-progress transcript.
    Partial(String),
    /// Accepted final transcript (trimmed, non-empty).
    Final(String),
    /// The user spoke while the avatar was speaking; the current turn has
    /// already been cancelled.
    BargeIn { partial: String },
}

/// Handle to a spawned transcriber task.
pub struct Transcriber {
    audio_tx: mpsc::Sender<Vec<u8>>,
    close_tx: watch::Sender<bool>,
}

impl Transcriber {
    /// Spawn the duplex channel task.
    pub fn spawn(
        settings: SttSettings,
        coordinator: Arc<InterruptCoordinator>,
        events: mpsc::Sender<SttEvent>,
    ) -> Self {
        let (audio_tx, audio_rx) = mpsc::channel::<Vec<u8>>(256);
        let (close_tx, close_rx) = watch::channel(false);

        tokio::spawn(run_channel(settings, coordinator, events, audio_rx, close_rx));

        Self { audio_tx, close_tx }
    }

    /// Forward one client audio frame (raw PCM16 bytes).
    pub async fn send_audio(&self, pcm: Vec<u8>) {
        if self.audio_tx.send(pcm).await.is_err() {
            tracing::debug!("transcriber task gone, audio frame dropped");
        }
    }

    /// Request close. Idempotent; if the channel is still connecting, the
    /// close is deferred until the socket opens, then the provider close
    /// token is sent before shutdown.
    pub fn close(&self) {
        let _ = self.close_tx.send(true);
    }
}

impl Drop for Transcriber {
    fn drop(&mut self) {
        let _ = self.close_tx.send(true);
    }
}

async fn run_channel(
    settings: SttSettings,
    coordinator: Arc<InterruptCoordinator>,
    events: mpsc::Sender<SttEvent>,
    mut audio_rx: mpsc::Receiver<Vec<u8>>,
    mut close_rx: watch::Receiver<bool>,
) {
    let ws = match open_socket(&settings).await {
        Ok(ws) => ws,
        Err(e) => {
            tracing::error!(error = %e, "failed to open STT channel");
            return;
        }
    };
    let (mut sink, mut stream) = ws.split();

    // A close requested while the socket was still connecting lands here.
    if *close_rx.borrow() {
        shutdown(&mut sink).await;
        return;
    }

    let session_update = serde_json::json!({
        "type": "transcription_session.update",
        "session": {
            "input_audio_format": "pcm16",
            "input_audio_transcription": {
                "model": settings.model,
                "language": settings.language,
            },
            "turn_detection": {
                "type": "server_vad",
                "threshold": settings.vad_threshold,
                "prefix_padding_ms": settings.prefix_padding_ms,
                "silence_duration_ms": settings.silence_duration_ms,
            },
        },
    });
    if let Err(e) = sink.send(WsMessage::Text(session_update.to_string())).await {
        tracing::error!(error = %e, "failed to configure STT session");
        return;
    }

    let mut in_progress = String::new();

    loop {
        tokio::select! {
            changed = close_rx.changed() => {
                if changed.is_err() || *close_rx.borrow() {
                    shutdown(&mut sink).await;
                    break;
                }
            }
            frame = audio_rx.recv() => {
                match frame {
                    Some(pcm) => {
                        let append = serde_json::json!({
                            "type": "input_audio_buffer.append",
                            "audio": BASE64.encode(&pcm),
                        });
                        if let Err(e) = sink.send(WsMessage::Text(append.to_string())).await {
                            tracing::warn!(error = %e, "failed to forward audio frame");
                            break;
                        }
                    }
                    None => {
                        shutdown(&mut sink).await;
                        break;
                    }
                }
            }
            message = stream.next() => {
                match message {
                    Some(Ok(WsMessage::Text(text))) => {
                        handle_provider_event(&text, &coordinator, &events, &mut in_progress).await;
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        tracing::info!("STT channel closed by provider");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "STT channel read failed");
                        break;
                    }
                }
            }
        }
    }
}

async fn open_socket(
    settings: &SttSettings,
) -> Result<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    MediaError,
> {
    let mut request = settings
        .url
        .as_str()
        .into_client_request()
        .map_err(|e| MediaError::Stt(e.to_string()))?;
    let auth = format!("Bearer {}", settings.api_key);
    request.headers_mut().insert(
        "Authorization",
        auth.parse().map_err(|_| MediaError::Stt("invalid API key header".to_string()))?,
    );
    request.headers_mut().insert(
        "OpenAI-Beta",
        "realtime=v1"
            .parse()
            .map_err(|_| MediaError::Stt("invalid beta header".to_string()))?,
    );

    let (ws, _) = connect_async(request).await?;
    tracing::info!("STT channel open");
    Ok(ws)
}

async fn shutdown<S>(sink: &mut S)
where
    S: futures::Sink<WsMessage> + Unpin,
    S::Error: std::fmt::Display,
{
    let close_token = serde_json::json!({"type": "session.close"});
    if let Err(e) = sink.send(WsMessage::Text(close_token.to_string())).await {
        tracing::debug!(error = %e, "close token not delivered");
    }
    let _ = sink.close().await;
}

async fn handle_provider_event(
    raw: &str,
    coordinator: &InterruptCoordinator,
    events: &mpsc::Sender<SttEvent>,
    in_progress: &mut String,
) {
    let Ok(event) = serde_json::from_str::<ProviderEvent>(raw) else {
        tracing::trace!("unrecognized STT frame skipped");
        return;
    };

    match event.kind.as_str() {
        "conversation.item.input_audio_transcription.delta" => {
            if let Some(delta) = event.delta {
                in_progress.push_str(&delta);
            }
            let partial = in_progress.clone();
            let _ = events.send(SttEvent::Partial(partial.clone())).await;

            // Barge-in: single-shot per turn, gated on a non-trivial partial.
            if partial.trim().chars().count() > 2 && coordinator.barge_in() {
                let _ = events.send(SttEvent::BargeIn { partial }).await;
            }
        }
        "conversation.item.input_audio_transcription.completed" => {
            let chosen = event
                .transcript
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| in_progress.clone());
            in_progress.clear();

            let finalized = chosen.trim().to_string();
            if finalized.is_empty() {
                return;
            }
            let _ = events.send(SttEvent::Final(finalized)).await;
        }
        _ => {}
    }
}

#[derive(Debug, Deserialize)]
struct ProviderEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    delta: Option<String>,
    #[serde(default)]
    transcript: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn drain(rx: &mut mpsc::Receiver<SttEvent>) -> Vec<SttEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    #[tokio::test]
    async fn deltas_accumulate_into_partials() {
        let coordinator = InterruptCoordinator::new();
        let (tx, mut rx) = mpsc::channel(16);
        let mut in_progress = String::new();

        handle_provider_event(
            r#"{"type":"conversation.item.input_audio_transcription.delta","delta":"hel"}"#,
            &coordinator,
            &tx,
            &mut in_progress,
        )
        .await;
        handle_provider_event(
            r#"{"type":"conversation.item.input_audio_transcription.delta","delta":"lo there"}"#,
            &coordinator,
            &tx,
            &mut in_progress,
        )
        .await;

        let events = drain(&mut rx).await;
        assert_eq!(
            events,
            vec![
                SttEvent::Partial("hel".to_string()),
                SttEvent::Partial("hello there".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn completed_prefers_provider_final_and_resets() {
        let coordinator = InterruptCoordinator::new();
        let (tx, mut rx) = mpsc::channel(16);
        let mut in_progress = "accumulated".to_string();

        handle_provider_event(
            r#"{"type":"conversation.item.input_audio_transcription.completed","transcript":"  Hello  "}"#,
            &coordinator,
            &tx,
            &mut in_progress,
        )
        .await;

        assert_eq!(drain(&mut rx).await, vec![SttEvent::Final("Hello".to_string())]);
        assert!(in_progress.is_empty());
    }

    #[tokio::test]
    async fn empty_final_falls_back_to_accumulated_deltas() {
        let coordinator = InterruptCoordinator::new();
        let (tx, mut rx) = mpsc::channel(16);
        let mut in_progress = "from deltas".to_string();

        handle_provider_event(
            r#"{"type":"conversation.item.input_audio_transcription.completed","transcript":"  "}"#,
            &coordinator,
            &tx,
            &mut in_progress,
        )
        .await;

        assert_eq!(
            drain(&mut rx).await,
            vec![SttEvent::Final("from deltas".to_string())]
        );
    }

    #[tokio::test]
    async fn empty_final_with_no_deltas_is_discarded() {
        let coordinator = InterruptCoordinator::new();
        let (tx, mut rx) = mpsc::channel(16);
        let mut in_progress = String::new();

        handle_provider_event(
            r#"{"type":"conversation.item.input_audio_transcription.completed","transcript":""}"#,
            &coordinator,
            &tx,
            &mut in_progress,
        )
        .await;

        assert!(drain(&mut rx).await.is_empty());
    }

    #[tokio::test]
    async fn barge_in_fires_once_while_avatar_speaks() {
        let coordinator = InterruptCoordinator::new();
        let handle = coordinator.begin_turn();
        coordinator.mark_speaking();

        let (tx, mut rx) = mpsc::channel(16);
        let mut in_progress = String::new();

        handle_provider_event(
            r#"{"type":"conversation.item.input_audio_transcription.delta","delta":"wait"}"#,
            &coordinator,
            &tx,
            &mut in_progress,
        )
        .await;

        let events = drain(&mut rx).await;
        assert_eq!(
            events,
            vec![
                SttEvent::Partial("wait".to_string()),
                SttEvent::BargeIn {
                    partial: "wait".to_string()
                },
            ]
        );
        assert!(handle.is_cancelled());

        // A second partial does not re-fire the signal.
        handle_provider_event(
            r#"{"type":"conversation.item.input_audio_transcription.delta","delta":" a moment"}"#,
            &coordinator,
            &tx,
            &mut in_progress,
        )
        .await;
        let events = drain(&mut rx).await;
        assert_eq!(events, vec![SttEvent::Partial("wait a moment".to_string())]);
    }

    #[tokio::test]
    async fn trivial_partial_does_not_barge_in() {
        let coordinator = InterruptCoordinator::new();
        coordinator.begin_turn();
        coordinator.mark_speaking();

        let (tx, mut rx) = mpsc::channel(16);
        let mut in_progress = String::new();

        handle_provider_event(
            r#"{"type":"conversation.item.input_audio_transcription.delta","delta":"um"}"#,
            &coordinator,
            &tx,
            &mut in_progress,
        )
        .await;

        assert_eq!(drain(&mut rx).await, vec![SttEvent::Partial("um".to_string())]);
        assert!(coordinator.is_speaking());
    }
}

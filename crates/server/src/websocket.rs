//! WebSocket handler
//!
//! One duplex channel per session. Inbound frames are JSON envelopes (or
//! raw binary PCM16 audio); outbound events drain from the session's
//! bounded queue through a single pump task so per-turn ordering is
//! preserved end to end.
//!
//! Turn serialization: accepted finals queue into the turn loop and run
//! one at a time. A barge-in cancels the in-flight turn at the
//! coordinator before the next final arrives; anything else simply waits
//! its turn in the queue.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use avatar_agent::{purchase, RespondOptions, TurnContext};
use avatar_core::{
    ClientEvent, Content, Error, EventSender, InboundEvent, InterruptCoordinator,
    InterruptionKind,
};
use avatar_media::{ElevenLabsStreamer, SttEvent, Transcriber, TtsSink};
use avatar_persistence::now_ms;

use crate::metrics::{record_barge_in, record_error, record_llm_latency, record_turn};
use crate::rate_limit::RateLimiter;
use crate::session::Session;
use crate::state::AppState;

/// One queued user utterance.
struct TurnRequest {
    text: String,
    proactive: bool,
}

/// WebSocket handler
pub struct WebSocketHandler;

impl WebSocketHandler {
    /// Handle WebSocket upgrade
    pub async fn handle(
        ws: WebSocketUpgrade,
        State(state): State<AppState>,
        Path(session_id): Path<String>,
    ) -> Result<Response, axum::http::StatusCode> {
        let session = state
            .sessions
            .get(&session_id)
            .ok_or(axum::http::StatusCode::NOT_FOUND)?;

        let rate_limiter = RateLimiter::new(
            state.settings.server.messages_per_second,
            state.settings.server.audio_bytes_per_second,
        );

        Ok(ws.on_upgrade(move |socket| Self::handle_socket(socket, session, state, rate_limiter)))
    }

    async fn handle_socket(
        socket: WebSocket,
        session: Arc<Session>,
        state: AppState,
        mut rate_limiter: RateLimiter,
    ) {
        let (mut ws_sink, mut ws_stream) = socket.split();
        let (events, mut events_rx) = EventSender::channel(state.settings.server.outgoing_queue);

        // Outbound pump: the only writer on the socket.
        let outbound_task = tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                let json = match serde_json::to_string(&event) {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::warn!(error = %e, "outbound event not serializable");
                        continue;
                    }
                };
                if ws_sink.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
        });

        // Duplex STT channel.
        let (stt_tx, stt_rx) = mpsc::channel(64);
        let transcriber = Transcriber::spawn(
            state.settings.stt.clone(),
            session.coordinator.clone(),
            stt_tx,
        );

        // Serialized turn loop.
        let (turn_tx, turn_rx) = mpsc::channel::<TurnRequest>(8);
        let turn_task = tokio::spawn(run_turn_loop(
            state.clone(),
            session.clone(),
            events.clone(),
            turn_rx,
        ));

        let stt_task = tokio::spawn(run_stt_events(
            state.clone(),
            session.clone(),
            events.clone(),
            stt_rx,
            turn_tx.clone(),
        ));

        if state.settings.agent.proactive_greeting {
            let _ = turn_tx
                .send(TurnRequest {
                    text: "The user just joined the session. Greet them briefly, in character."
                        .to_string(),
                    proactive: true,
                })
                .await;
        }

        // Inbound loop.
        while let Some(message) = ws_stream.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    if let Err(e) = rate_limiter.check_message() {
                        tracing::warn!(session_id = %session.id, error = %e, "message rate limit");
                        continue;
                    }
                    session.touch();

                    match serde_json::from_str::<InboundEvent>(&text) {
                        Ok(event) => {
                            let ended = handle_inbound(
                                event,
                                &state,
                                &session,
                                &events,
                                &transcriber,
                                &turn_tx,
                                &mut rate_limiter,
                            )
                            .await;
                            if ended {
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::debug!(error = %e, "unparseable inbound frame skipped");
                        }
                    }
                }
                Ok(Message::Binary(data)) => {
                    if rate_limiter.check_audio(data.len()).is_err() {
                        tracing::warn!(session_id = %session.id, "audio rate limit");
                        continue;
                    }
                    session.touch();
                    transcriber.send_audio(data).await;
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(error = %e, "websocket read failed");
                    break;
                }
            }
        }

        // Teardown: close the STT channel, cancel any in-flight turn,
        // release the purchase entry, and drop the session.
        transcriber.close();
        session.close();
        state.purchases.clear(&session.id);
        if let Err(e) = state.session_records.close(&session.id, now_ms()).await {
            tracing::warn!(error = %e, "session record close failed");
        }
        state.sessions.remove(&session.id);

        stt_task.abort();
        turn_task.abort();
        outbound_task.abort();

        tracing::info!(session_id = %session.id, "websocket closed");
    }
}

/// Route one inbound event. Returns true when the session should end.
async fn handle_inbound(
    event: InboundEvent,
    state: &AppState,
    session: &Arc<Session>,
    events: &EventSender,
    transcriber: &Transcriber,
    turn_tx: &mpsc::Sender<TurnRequest>,
    rate_limiter: &mut RateLimiter,
) -> bool {
    match event {
        InboundEvent::AudioFrame { audio } => match BASE64.decode(&audio) {
            Ok(pcm) => {
                if rate_limiter.check_audio(pcm.len()).is_err() {
                    tracing::warn!(session_id = %session.id, "audio rate limit");
                    return false;
                }
                transcriber.send_audio(pcm).await;
            }
            Err(e) => tracing::debug!(error = %e, "undecodable audio frame"),
        },
        InboundEvent::VisionImage { image, .. } => match BASE64.decode(&image) {
            Ok(bytes) => session.set_vision(bytes),
            Err(e) => tracing::debug!(error = %e, "undecodable vision frame"),
        },
        InboundEvent::TextMessage { text } => {
            // Bypasses the transcriber; handled exactly like a final
            // transcript, vision slot included.
            if turn_tx
                .send(TurnRequest {
                    text,
                    proactive: false,
                })
                .await
                .is_err()
            {
                return true;
            }
        }
        InboundEvent::PurchaseStatus { status, data } => {
            state.purchases.set(&session.id, status, data.clone());
            let entry = state.purchases.get(&session.id);
            let guidance = purchase::guidance(&entry).unwrap_or_default();
            events
                .emit(ClientEvent::LlmContextUpdate {
                    kind: status,
                    guidance,
                    session_id: session.id.clone(),
                    data: if data.is_empty() { None } else { Some(data) },
                })
                .await;
        }
        InboundEvent::End => return true,
    }
    false
}

/// Consume transcriber events: relay partials/finals, fan barge-ins out
/// to the client, and queue accepted finals as turns.
async fn run_stt_events(
    state: AppState,
    session: Arc<Session>,
    events: EventSender,
    mut stt_rx: mpsc::Receiver<SttEvent>,
    turn_tx: mpsc::Sender<TurnRequest>,
) {
    while let Some(event) = stt_rx.recv().await {
        session.touch();
        match event {
            SttEvent::Partial(text) => {
                events.emit(ClientEvent::TranscriptionPartial { text }).await;
            }
            SttEvent::BargeIn { partial } => {
                record_barge_in();
                events
                    .emit(ClientEvent::UserSpoke {
                        partial_transcript: partial,
                        interruption_type: InterruptionKind::DuringSpeech,
                    })
                    .await;
                speak_interruption_reply(&state, &session, &events);
            }
            SttEvent::Final(text) => {
                events
                    .emit(ClientEvent::TranscriptionFinal { text: text.clone() })
                    .await;
                if turn_tx
                    .send(TurnRequest {
                        text,
                        proactive: false,
                    })
                    .await
                    .is_err()
                {
                    break;
                }
            }
        }
    }
}

/// Short spoken reaction after a barge-in, synthesized through a fresh
/// one-shot sink so the session's speaking flag stays untouched.
fn speak_interruption_reply(state: &AppState, session: &Arc<Session>, events: &EventSender) {
    let state = state.clone();
    let session = session.clone();
    let events = events.clone();
    tokio::spawn(async move {
        let reply = state
            .orchestrator
            .interruption_reply(&session.persona_id, InterruptionKind::DuringSpeech)
            .await;
        let voice_id = state
            .personas
            .lookup(&session.persona_id)
            .await
            .ok()
            .and_then(|persona| persona.voice_id.clone());

        let sink = ElevenLabsStreamer::new(
            state.settings.tts.clone(),
            voice_id.as_deref(),
            &session.persona_id,
            events,
            Arc::new(InterruptCoordinator::new()),
            CancellationToken::new(),
        );
        sink.on_chunk(&reply).await;
        sink.on_complete().await;
    });
}

/// Serialized turn loop: one orchestrator call at a time per session.
async fn run_turn_loop(
    state: AppState,
    session: Arc<Session>,
    events: EventSender,
    mut turn_rx: mpsc::Receiver<TurnRequest>,
) {
    let voice_id = state
        .personas
        .lookup(&session.persona_id)
        .await
        .ok()
        .and_then(|persona| persona.voice_id.clone());

    while let Some(request) = turn_rx.recv().await {
        if !session.is_active() {
            break;
        }

        let handle = session.coordinator.begin_turn();
        let tts: Arc<dyn TtsSink> = Arc::new(ElevenLabsStreamer::new(
            state.settings.tts.clone(),
            voice_id.as_deref(),
            &session.persona_id,
            events.clone(),
            session.coordinator.clone(),
            handle.token(),
        ));

        // The vision slot is consulted at turn start: fresh images inline
        // into the user message, slightly older ones stay available to the
        // style tool.
        let vision_inline = if request.proactive {
            None
        } else {
            session.vision_inline_url()
        };
        let content = match &vision_inline {
            Some(url) => Content::with_image(&request.text, url),
            None => Content::text(&request.text),
        };

        let ctx = TurnContext {
            session_id: session.id.clone(),
            call_session_id: Some(session.id.clone()),
            user_id: session.user_id.clone(),
            persona_id: session.persona_id.clone(),
            events: events.clone(),
            coordinator: session.coordinator.clone(),
            cancel: handle.token(),
            vision_inline_url: vision_inline,
            vision_recent_url: session.vision_recent_url(),
        };

        let started = Instant::now();
        match state
            .orchestrator
            .respond(
                content,
                &ctx,
                RespondOptions {
                    proactive: request.proactive,
                    tts: Some(tts),
                },
            )
            .await
        {
            Ok(_) => {
                record_turn("complete");
                record_llm_latency(started.elapsed().as_millis() as u64);
            }
            Err(Error::Cancelled) => {
                record_turn("cancelled");
                tracing::debug!(session_id = %session.id, "turn cancelled");
            }
            Err(e) => {
                record_turn("error");
                record_error("llm");
                tracing::warn!(session_id = %session.id, error = %e, "turn failed");
            }
        }
        session.coordinator.finish_turn();
    }
}

//! Conversation orchestrator
//!
//! Drives one turn end to end: persona lookup, history assembly, system
//! prompt, streamed completion with a 30 s wall-clock deadline, fan-out to
//! the client and the TTS sink, tool dispatch, and transcript
//! persistence. Exactly one `llm_response_complete` xor one
//! `llm_response_error` leaves per started turn, unless the turn is
//! cancelled by barge-in, in which case neither does.

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use avatar_config::FeatureFlags;
use avatar_core::{
    ClientEvent, Content, Error, EventSender, InterruptCoordinator, InterruptionKind, Message,
    Result,
};
use avatar_llm::{ChatBackend, ChatEvent, ChatRequest, FinishReason};
use avatar_media::TtsSink;
use avatar_persistence::TranscriptStore;

use crate::history;
use crate::persona_store::PersonaStore;
use crate::prompt;
use crate::purchase::PurchaseFlowTracker;
use crate::tools::{ToolCallContext, ToolRegistry};

/// Returned to callers when the primary stream fails.
pub const FALLBACK_APOLOGY: &str =
    "I apologize, but I'm having trouble processing your request right now. Could you please try again?";

const INTERRUPTION_FALLBACKS: [&str; 5] = ["Oh, sorry!", "Oops!", "My bad!", "Sorry!", "Oh!"];

/// Per-turn wiring owned by the session.
#[derive(Clone)]
pub struct TurnContext {
    pub session_id: String,
    /// Set for live call sessions; gates call-bound tools.
    pub call_session_id: Option<String>,
    pub user_id: Option<String>,
    pub persona_id: String,
    pub events: EventSender,
    pub coordinator: Arc<InterruptCoordinator>,
    pub cancel: CancellationToken,
    /// Vision slot snapshot, fresh enough to inline (< 30 s).
    pub vision_inline_url: Option<String>,
    /// Vision slot snapshot, fresh enough for tool use (< 5 min).
    pub vision_recent_url: Option<String>,
}

/// Per-call options.
#[derive(Default)]
pub struct RespondOptions {
    /// Proactive turns have no user utterance; only the assistant message
    /// is persisted.
    pub proactive: bool,
    pub tts: Option<Arc<dyn TtsSink>>,
}

/// Process-wide orchestrator; all per-session state arrives via the turn
/// context.
pub struct Orchestrator {
    llm: Arc<dyn ChatBackend>,
    personas: Arc<PersonaStore>,
    transcripts: Arc<dyn TranscriptStore>,
    registry: ToolRegistry,
    purchases: Arc<PurchaseFlowTracker>,
    features: FeatureFlags,
    turn_timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        llm: Arc<dyn ChatBackend>,
        personas: Arc<PersonaStore>,
        transcripts: Arc<dyn TranscriptStore>,
        registry: ToolRegistry,
        purchases: Arc<PurchaseFlowTracker>,
        features: FeatureFlags,
        turn_timeout: Duration,
    ) -> Self {
        Self {
            llm,
            personas,
            transcripts,
            registry,
            purchases,
            features,
            turn_timeout,
        }
    }

    /// Run one turn. Returns the assistant text that was emitted and
    /// persisted; `Error::Cancelled` when barge-in or session end stopped
    /// the turn (no terminal client event in that case).
    pub async fn respond(
        &self,
        user_message: Content,
        ctx: &TurnContext,
        options: RespondOptions,
    ) -> Result<String> {
        let persona = match self.personas.lookup(&ctx.persona_id).await {
            Ok(persona) => persona,
            Err(e) => {
                ctx.events
                    .emit(ClientEvent::LlmResponseError {
                        error: e.to_string(),
                        avatar_id: ctx.persona_id.clone(),
                    })
                    .await;
                return Err(e);
            }
        };
        let avatar_id = persona.id.clone();

        // Cross-session history; a read failure degrades to an empty
        // history rather than killing the turn.
        let user_key = ctx
            .user_id
            .clone()
            .unwrap_or_else(|| ctx.session_id.clone());
        let raw = match self.transcripts.history_for(&user_key, &persona.id).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "history read failed, starting from empty history");
                Vec::new()
            }
        };
        let mut history_messages = history::assemble(&raw);

        let current = Message::user(user_message.clone());
        if current.content.has_image() {
            // The current message is now the most recent image bearer.
            history::strip_all_images(&mut history_messages);
        }

        // Input image for vision-dependent tools: the vision slot if fresh
        // enough, else the most recent image-bearing message.
        let input_image_url = ctx
            .vision_recent_url
            .clone()
            .or_else(|| current.content.image_url().map(str::to_string))
            .or_else(|| {
                history_messages
                    .iter()
                    .rev()
                    .find_map(|m| m.content.image_url().map(str::to_string))
            });

        let system = prompt::build_system_prompt(&persona, &self.purchases.get(&ctx.session_id));
        let mut messages = Vec::with_capacity(history_messages.len() + 2);
        messages.push(Message::system(system));
        messages.append(&mut history_messages);
        messages.push(current);

        let tools = self.registry.definitions_for(&persona, &self.features);

        ctx.events
            .emit(ClientEvent::LlmResponseStart {
                avatar_id: avatar_id.clone(),
            })
            .await;

        let request = ChatRequest::new(messages).with_tools(tools);
        let mut rx = match self.llm.stream_chat(request).await {
            Ok(rx) => rx,
            Err(e) => return self.fail_turn(ctx, &avatar_id, e.into()).await,
        };

        let deadline = tokio::time::Instant::now() + self.turn_timeout;
        let outcome = loop {
            tokio::select! {
                _ = ctx.cancel.cancelled() => {
                    tracing::info!(session_id = %ctx.session_id, "turn cancelled mid-stream");
                    ctx.coordinator.clear_speaking();
                    return Err(Error::Cancelled);
                }
                _ = tokio::time::sleep_until(deadline) => {
                    return self.fail_turn(ctx, &avatar_id, Error::UpstreamTimeout).await;
                }
                event = rx.recv() => match event {
                    Some(ChatEvent::Delta(text)) => {
                        ctx.events
                            .emit(ClientEvent::LlmResponseChunk {
                                content: text.clone(),
                                avatar_id: avatar_id.clone(),
                                complete: false,
                            })
                            .await;
                        if let Some(tts) = &options.tts {
                            tts.on_chunk(&text).await;
                        }
                    }
                    Some(ChatEvent::Done(outcome)) => break outcome,
                    Some(ChatEvent::Error(e)) => {
                        return self.fail_turn(ctx, &avatar_id, e.into()).await;
                    }
                    None => {
                        return self
                            .fail_turn(
                                ctx,
                                &avatar_id,
                                Error::Upstream("completion stream closed".to_string()),
                            )
                            .await;
                    }
                }
            }
        };

        if outcome.finish == FinishReason::Cancelled {
            ctx.coordinator.clear_speaking();
            return Err(Error::Cancelled);
        }

        let mut final_text = outcome.text.clone();
        let mut terminal_emitted = false;

        if outcome.finish == FinishReason::ToolCalls {
            if let Some(invocation) = outcome.tool_call.clone() {
                tracing::info!(tool = %invocation.name, session_id = %ctx.session_id, "dispatching tool call");
                let tool_ctx = ToolCallContext {
                    session_id: ctx.session_id.clone(),
                    call_session_id: ctx.call_session_id.clone(),
                    persona: persona.clone(),
                    events: ctx.events.clone(),
                    lead_in_text: outcome.text.clone(),
                    input_image_url,
                };
                if let Some(reply) = self.registry.dispatch(invocation, &tool_ctx).await {
                    if let Some(text) = reply.text {
                        final_text = text;
                    }
                    terminal_emitted = reply.terminal_emitted;
                }
            }
        }

        if let Some(tts) = &options.tts {
            tts.on_complete().await;
        }

        if !terminal_emitted {
            ctx.events
                .emit(ClientEvent::LlmResponseComplete {
                    full_response: final_text.clone(),
                    avatar_id: avatar_id.clone(),
                    complete: true,
                    style_generation: None,
                })
                .await;
        }
        ctx.coordinator.clear_speaking();

        // Transcript persistence; cancelled turns never reach this point,
        // and write failures never fail the turn.
        let mut to_append = Vec::new();
        if !options.proactive {
            to_append.push(Message::user(user_message));
        }
        to_append.push(Message::assistant(final_text.clone()));
        if let Err(e) = self
            .transcripts
            .append(&ctx.session_id, &user_key, &persona.id, &to_append)
            .await
        {
            tracing::warn!(error = %e, session_id = %ctx.session_id, "transcript append failed");
        }

        Ok(final_text)
    }

    /// Short interruption reply for the client's TTS, a few words at
    /// most, with a fixed fallback set.
    pub async fn interruption_reply(&self, persona_id: &str, kind: InterruptionKind) -> String {
        let persona = match self.personas.lookup(persona_id).await {
            Ok(persona) => persona,
            Err(_) => return random_fallback(),
        };

        let situation = match kind {
            InterruptionKind::DuringSpeech => {
                "You were mid-sentence and the user started speaking over you."
            }
            InterruptionKind::DuringThinking => {
                "You were composing a reply and the user jumped in."
            }
            InterruptionKind::FalseStart => {
                "You started answering before the user finished their thought."
            }
            InterruptionKind::Clarification => "The user wants to clarify what they just said.",
        };
        let system = format!(
            "You are {}. {} React with a very short spoken phrase, a few words at most, in \
             your persona's tone. No explanations.",
            persona.display_name, situation
        );

        match self.llm.complete_short(&system, "React now.", 50).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            _ => random_fallback(),
        }
    }
}

impl Orchestrator {
    async fn fail_turn(&self, ctx: &TurnContext, avatar_id: &str, error: Error) -> Result<String> {
        tracing::error!(session_id = %ctx.session_id, error = %error, "turn failed");
        ctx.coordinator.clear_speaking();
        ctx.events
            .emit(ClientEvent::LlmResponseError {
                error: error.to_string(),
                avatar_id: avatar_id.to_string(),
            })
            .await;
        Err(error)
    }
}

fn random_fallback() -> String {
    let index = rand::thread_rng().gen_range(0..INTERRUPTION_FALLBACKS.len());
    INTERRUPTION_FALLBACKS[index].to_string()
}

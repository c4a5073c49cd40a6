//! End-to-end turn flows against scripted backends
//!
//! Exercises the orchestrator with a scripted LLM, in-memory stores, and a
//! fake style generator: event ordering, transcript writes, tool dispatch,
//! barge-in cancellation, and the turn deadline.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use avatar_agent::tools::products::TrendingProductsTool;
use avatar_agent::tools::style::StyleSuggestionTool;
use avatar_agent::{
    Orchestrator, PersonaStore, PurchaseFlowTracker, RespondOptions, StaticPersonaSource,
    StaticProductCatalog, ToolRegistry, TurnContext,
};
use avatar_config::FeatureFlags;
use avatar_core::{
    ClientEvent, Content, Error, EventSender, InterruptCoordinator, Persona, PersonaCategory,
    Product, PurchaseFlowStatus, ReferenceOutfit, Role, StyleGenerationKind,
};
use avatar_imagegen::{ImageGenError, StyleGenerator, StyleOutput, StyleRequest};
use avatar_llm::{
    ChatBackend, ChatEvent, ChatOutcome, ChatRequest, FinishReason, LlmError, ToolInvocation,
};
use avatar_persistence::{
    MemoryStyleGenerationStore, MemoryTranscriptStore, StyleGenerationStore, TranscriptStore,
};

// ---------------------------------------------------------------------------
// Scripted fakes
// ---------------------------------------------------------------------------

enum Script {
    /// Send the deltas, then finish (or hang forever when `outcome` is
    /// `None`).
    Stream {
        deltas: Vec<&'static str>,
        outcome: Option<ChatOutcome>,
    },
    Fail(LlmError),
}

#[derive(Default)]
struct ScriptedBackend {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<ChatRequest>>,
    short_reply: Mutex<Option<String>>,
}

impl ScriptedBackend {
    fn push(&self, script: Script) {
        self.scripts.lock().push_back(script);
    }

    fn last_request(&self) -> ChatRequest {
        self.requests.lock().last().cloned().expect("no request recorded")
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn stream_chat(&self, request: ChatRequest) -> Result<mpsc::Receiver<ChatEvent>, LlmError> {
        self.requests.lock().push(request);
        let script = self
            .scripts
            .lock()
            .pop_front()
            .expect("no script for stream_chat");

        match script {
            Script::Fail(error) => Err(error),
            Script::Stream { deltas, outcome } => {
                let (tx, rx) = mpsc::channel(64);
                tokio::spawn(async move {
                    for delta in deltas {
                        if tx.send(ChatEvent::Delta(delta.to_string())).await.is_err() {
                            return;
                        }
                    }
                    match outcome {
                        Some(outcome) => {
                            let _ = tx.send(ChatEvent::Done(outcome)).await;
                        }
                        None => {
                            // Keep the sender alive without finishing.
                            futures::future::pending::<()>().await;
                        }
                    }
                });
                Ok(rx)
            }
        }
    }

    async fn complete_short(
        &self,
        _system: &str,
        _user: &str,
        _max_tokens: u32,
    ) -> Result<String, LlmError> {
        match self.short_reply.lock().clone() {
            Some(reply) => Ok(reply),
            None => Err(LlmError::Api("no short reply scripted".to_string())),
        }
    }
}

#[derive(Default)]
struct FakeStyleGenerator {
    requests: Mutex<Vec<StyleRequest>>,
    fail: Mutex<bool>,
}

#[async_trait]
impl StyleGenerator for FakeStyleGenerator {
    async fn generate_style(&self, request: StyleRequest) -> Result<StyleOutput, ImageGenError> {
        self.requests.lock().push(request);
        if *self.fail.lock() {
            return Err(ImageGenError::NoMediaReturned);
        }
        Ok(StyleOutput {
            generated_url: "https://store/style-suggestions/p1/s1-1.png".to_string(),
            provider_url: "https://provider/tmp.png".to_string(),
            model_used: "tryon".to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn generic_persona() -> Persona {
    Persona {
        id: "ava".to_string(),
        display_name: "Ava".to_string(),
        category: PersonaCategory::Generic,
        system_prompt: "You are Ava, a friendly companion.".to_string(),
        voice_id: None,
        reference_outfits: Vec::new(),
        preferred_genres: Vec::new(),
        vision_capture_interval_secs: None,
        price_per_minute: None,
    }
}

fn stylist_persona() -> Persona {
    Persona {
        id: "sasha".to_string(),
        display_name: "Sasha".to_string(),
        category: PersonaCategory::Stylist,
        system_prompt: "You are Sasha, a personal stylist.".to_string(),
        voice_id: Some("voice-sasha".to_string()),
        reference_outfits: vec![ReferenceOutfit {
            id: "o1".to_string(),
            name: "Red Dress".to_string(),
            brand: "Acme".to_string(),
            image_url: "https://img/red-dress.jpg".to_string(),
            tags: vec!["evening".to_string()],
            description: "A flowing red evening dress".to_string(),
        }],
        preferred_genres: Vec::new(),
        vision_capture_interval_secs: None,
        price_per_minute: None,
    }
}

struct Harness {
    orchestrator: Orchestrator,
    backend: Arc<ScriptedBackend>,
    transcripts: Arc<MemoryTranscriptStore>,
    styles: Arc<MemoryStyleGenerationStore>,
    generator: Arc<FakeStyleGenerator>,
    purchases: Arc<PurchaseFlowTracker>,
    events_rx: mpsc::Receiver<ClientEvent>,
    events: EventSender,
}

fn harness(turn_timeout: Duration, product_purchase: bool) -> Harness {
    let backend = Arc::new(ScriptedBackend::default());
    let transcripts = Arc::new(MemoryTranscriptStore::new());
    let styles = Arc::new(MemoryStyleGenerationStore::new());
    let generator = Arc::new(FakeStyleGenerator::default());
    let purchases = Arc::new(PurchaseFlowTracker::new());

    let personas = Arc::new(PersonaStore::new(Arc::new(StaticPersonaSource::new(vec![
        generic_persona(),
        stylist_persona(),
    ]))));

    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(StyleSuggestionTool::new(
        generator.clone(),
        styles.clone() as Arc<dyn StyleGenerationStore>,
        backend.clone() as Arc<dyn ChatBackend>,
    )));
    registry.register(Arc::new(TrendingProductsTool::new(
        Arc::new(StaticProductCatalog::new(vec![Product {
            id: "prod-1".to_string(),
            name: "Neon Jacket".to_string(),
            price: 49.9,
            image_url: None,
            url: None,
        }])),
        purchases.clone(),
    )));

    let orchestrator = Orchestrator::new(
        backend.clone() as Arc<dyn ChatBackend>,
        personas,
        transcripts.clone() as Arc<dyn TranscriptStore>,
        registry,
        purchases.clone(),
        FeatureFlags { product_purchase },
        turn_timeout,
    );

    let (events, events_rx) = EventSender::channel(64);
    Harness {
        orchestrator,
        backend,
        transcripts,
        styles,
        generator,
        purchases,
        events_rx,
        events,
    }
}

fn context(h: &Harness, persona_id: &str) -> (TurnContext, avatar_core::TurnHandle) {
    let coordinator = Arc::new(InterruptCoordinator::new());
    let handle = coordinator.begin_turn();
    let ctx = TurnContext {
        session_id: "s1".to_string(),
        call_session_id: Some("s1".to_string()),
        user_id: Some("u1".to_string()),
        persona_id: persona_id.to_string(),
        events: h.events.clone(),
        coordinator,
        cancel: handle.token(),
        vision_inline_url: None,
        vision_recent_url: None,
    };
    (ctx, handle)
}

async fn collect(rx: &mut mpsc::Receiver<ClientEvent>, n: usize) -> Vec<ClientEvent> {
    let mut events = Vec::new();
    for _ in 0..n {
        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed");
        events.push(event);
    }
    events
}

fn stop_outcome(text: &str) -> ChatOutcome {
    ChatOutcome {
        text: text.to_string(),
        tool_call: None,
        finish: FinishReason::Stop,
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn pure_text_turn_emits_ordered_events_and_persists() {
    let mut h = harness(Duration::from_secs(30), false);
    h.backend.push(Script::Stream {
        deltas: vec!["Hi ", "there!"],
        outcome: Some(stop_outcome("Hi there!")),
    });

    let (ctx, _handle) = context(&h, "ava");
    let reply = h
        .orchestrator
        .respond(Content::text("Hello"), &ctx, RespondOptions::default())
        .await
        .unwrap();
    assert_eq!(reply, "Hi there!");

    let events = collect(&mut h.events_rx, 4).await;
    assert!(matches!(events[0], ClientEvent::LlmResponseStart { .. }));
    assert!(matches!(
        &events[1],
        ClientEvent::LlmResponseChunk { content, complete: false, .. } if content == "Hi "
    ));
    assert!(matches!(
        &events[2],
        ClientEvent::LlmResponseChunk { content, .. } if content == "there!"
    ));
    match &events[3] {
        ClientEvent::LlmResponseComplete {
            full_response,
            complete,
            style_generation,
            ..
        } => {
            assert_eq!(full_response, "Hi there!");
            assert!(*complete);
            assert!(style_generation.is_none());
        }
        other => panic!("expected complete, got {:?}", other),
    }

    let history = h.transcripts.history_for("u1", "ava").await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, Role::User);
    assert_eq!(history[1].role, Role::Assistant);
    assert_eq!(history[1].content, serde_json::json!("Hi there!"));
}

#[tokio::test]
async fn image_bearing_turn_reaches_the_model() {
    let mut h = harness(Duration::from_secs(30), false);
    h.backend.push(Script::Stream {
        deltas: vec!["Looks great!"],
        outcome: Some(stop_outcome("Looks great!")),
    });

    let (ctx, _handle) = context(&h, "ava");
    let message = Content::with_image("does this suit me?", "data:image/jpeg;base64,abcd");
    h.orchestrator
        .respond(message, &ctx, RespondOptions::default())
        .await
        .unwrap();

    let request = h.backend.last_request();
    let user_message = request.messages.last().unwrap();
    assert_eq!(
        user_message.content.image_url(),
        Some("data:image/jpeg;base64,abcd")
    );

    // Only the current message carries an image in the assembled input.
    let image_bearing = request
        .messages
        .iter()
        .filter(|m| m.content.has_image())
        .count();
    assert_eq!(image_bearing, 1);
    let _ = collect(&mut h.events_rx, 3).await;
}

#[tokio::test]
async fn stylist_tool_call_runs_feedback_then_completion() {
    let mut h = harness(Duration::from_secs(30), false);
    *h.backend.short_reply.lock() = Some("Check out your new look!".to_string());
    h.backend.push(Script::Stream {
        deltas: vec!["One sec!"],
        outcome: Some(ChatOutcome {
            text: "One sec!".to_string(),
            tool_call: Some(ToolInvocation {
                id: "call_1".to_string(),
                name: "generate_style_suggestion".to_string(),
                arguments: serde_json::json!({
                    "suggestion_prompt": "the Acme red dress",
                    "use_reference_outfit": true,
                    "reference_outfit_index": 0
                }),
            }),
            finish: FinishReason::ToolCalls,
        }),
    });

    let (mut ctx, _handle) = context(&h, "sasha");
    ctx.vision_recent_url = Some("data:image/jpeg;base64,selfie".to_string());

    let reply = h
        .orchestrator
        .respond(
            Content::text("show me in the Acme one"),
            &ctx,
            RespondOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(reply, "One sec!");

    // start, chunk, feedback complete, completion complete
    let events = collect(&mut h.events_rx, 4).await;
    match &events[2] {
        ClientEvent::LlmResponseComplete {
            style_generation: Some(payload),
            full_response,
            ..
        } => {
            assert_eq!(payload.kind, StyleGenerationKind::Feedback);
            assert_eq!(full_response, "One sec!");
            assert!(payload.prompt.is_some());
        }
        other => panic!("expected feedback complete, got {:?}", other),
    }
    match &events[3] {
        ClientEvent::LlmResponseComplete {
            style_generation: Some(payload),
            full_response,
            ..
        } => {
            assert_eq!(payload.kind, StyleGenerationKind::Completion);
            assert_eq!(
                payload.image_url.as_deref(),
                Some("https://store/style-suggestions/p1/s1-1.png")
            );
            assert_eq!(full_response, "Check out your new look!");
        }
        other => panic!("expected completion complete, got {:?}", other),
    }

    // Try-on path used the reference garment.
    let requests = h.generator.requests.lock();
    assert_eq!(
        requests[0].reference_image_urls,
        vec!["https://img/red-dress.jpg".to_string()]
    );
    drop(requests);

    // A style_generations row was persisted.
    let rows = h.styles.for_session("s1").await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].generated_url, "https://store/style-suggestions/p1/s1-1.png");
}

#[tokio::test]
async fn style_generation_failure_emits_style_error() {
    let mut h = harness(Duration::from_secs(30), false);
    *h.generator.fail.lock() = true;
    h.backend.push(Script::Stream {
        deltas: vec![],
        outcome: Some(ChatOutcome {
            text: String::new(),
            tool_call: Some(ToolInvocation {
                id: "call_1".to_string(),
                name: "generate_style_suggestion".to_string(),
                arguments: serde_json::json!({
                    "suggestion_prompt": "something bold",
                    "use_reference_outfit": false
                }),
            }),
            finish: FinishReason::ToolCalls,
        }),
    });

    let (mut ctx, _handle) = context(&h, "sasha");
    ctx.vision_recent_url = Some("data:image/jpeg;base64,selfie".to_string());
    h.orchestrator
        .respond(Content::text("go ahead"), &ctx, RespondOptions::default())
        .await
        .unwrap();

    // start, feedback complete, style error
    let events = collect(&mut h.events_rx, 3).await;
    assert!(matches!(events[1], ClientEvent::LlmResponseComplete { .. }));
    match &events[2] {
        ClientEvent::StyleSuggestionError { error, .. } => {
            assert!(error.contains("no media"));
        }
        other => panic!("expected style error, got {:?}", other),
    }
}

#[tokio::test]
async fn products_tool_transitions_funnel_and_lists_items() {
    let mut h = harness(Duration::from_secs(30), true);
    h.backend.push(Script::Stream {
        deltas: vec![],
        outcome: Some(ChatOutcome {
            text: String::new(),
            tool_call: Some(ToolInvocation {
                id: "call_1".to_string(),
                name: "get_trending_products".to_string(),
                arguments: serde_json::json!({}),
            }),
            finish: FinishReason::ToolCalls,
        }),
    });

    let (ctx, _handle) = context(&h, "ava");
    let reply = h
        .orchestrator
        .respond(
            Content::text("what's trending?"),
            &ctx,
            RespondOptions::default(),
        )
        .await
        .unwrap();
    assert!(reply.contains("Neon Jacket"));

    // start, products-display, complete
    let events = collect(&mut h.events_rx, 3).await;
    match &events[1] {
        ClientEvent::ProductsDisplay { products, session_id, .. } => {
            assert_eq!(products.len(), 1);
            assert_eq!(session_id, "s1");
        }
        other => panic!("expected products-display, got {:?}", other),
    }
    assert!(matches!(events[2], ClientEvent::LlmResponseComplete { .. }));

    assert_eq!(
        h.purchases.get("s1").status,
        PurchaseFlowStatus::ProductsDisplayed
    );
}

#[tokio::test]
async fn unknown_tool_name_falls_through() {
    let mut h = harness(Duration::from_secs(30), false);
    h.backend.push(Script::Stream {
        deltas: vec!["As I was saying"],
        outcome: Some(ChatOutcome {
            text: "As I was saying".to_string(),
            tool_call: Some(ToolInvocation {
                id: "call_1".to_string(),
                name: "not_a_real_tool".to_string(),
                arguments: serde_json::json!({}),
            }),
            finish: FinishReason::ToolCalls,
        }),
    });

    let (ctx, _handle) = context(&h, "ava");
    let reply = h
        .orchestrator
        .respond(Content::text("hm"), &ctx, RespondOptions::default())
        .await
        .unwrap();
    assert_eq!(reply, "As I was saying");

    let events = collect(&mut h.events_rx, 3).await;
    assert!(matches!(&events[2], ClientEvent::LlmResponseComplete { full_response, .. }
        if full_response == "As I was saying"));
}

#[tokio::test]
async fn barge_in_cancels_without_terminal_event_or_append() {
    let mut h = harness(Duration::from_secs(30), false);
    h.backend.push(Script::Stream {
        deltas: vec!["Let me tell you about "],
        outcome: None, // stream keeps going until cancelled
    });

    let (ctx, handle) = context(&h, "ava");
    let orchestrator = Arc::new(h.orchestrator);
    let respond_ctx = ctx.clone();
    let task = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move {
            orchestrator
                .respond(Content::text("tell me a story"), &respond_ctx, RespondOptions::default())
                .await
        }
    });

    // Wait until the turn is streaming, then barge in.
    let _ = collect(&mut h.events_rx, 2).await; // start + first chunk
    ctx.coordinator.mark_speaking();
    assert!(ctx.coordinator.barge_in());
    assert!(handle.is_cancelled());

    let result = task.await.unwrap();
    assert!(matches!(result, Err(Error::Cancelled)));

    // No terminal event of either kind, and no transcript append.
    assert!(h.events_rx.try_recv().is_err());
    let history = h.transcripts.history_for("u1", "ava").await.unwrap();
    assert!(history.is_empty());
}

#[tokio::test(start_paused = true)]
async fn deadline_fails_turn_with_error_event() {
    let mut h = harness(Duration::from_secs(30), false);
    h.backend.push(Script::Stream {
        deltas: vec![],
        outcome: None, // never finishes
    });

    let (ctx, _handle) = context(&h, "ava");
    let result = h
        .orchestrator
        .respond(Content::text("Hello"), &ctx, RespondOptions::default())
        .await;
    assert!(matches!(result, Err(Error::UpstreamTimeout)));

    let events = collect(&mut h.events_rx, 2).await;
    assert!(matches!(events[0], ClientEvent::LlmResponseStart { .. }));
    assert!(matches!(events[1], ClientEvent::LlmResponseError { .. }));

    let history = h.transcripts.history_for("u1", "ava").await.unwrap();
    assert!(history.is_empty());
}

#[tokio::test]
async fn missing_persona_surfaces_error_event() {
    let mut h = harness(Duration::from_secs(30), false);
    let (ctx, _handle) = context(&h, "ghost");

    let result = h
        .orchestrator
        .respond(Content::text("hi"), &ctx, RespondOptions::default())
        .await;
    assert!(matches!(result, Err(Error::PersonaMissing(_))));

    let events = collect(&mut h.events_rx, 1).await;
    assert!(matches!(events[0], ClientEvent::LlmResponseError { .. }));
}

#[tokio::test]
async fn proactive_turn_appends_assistant_only() {
    let mut h = harness(Duration::from_secs(30), false);
    h.backend.push(Script::Stream {
        deltas: vec!["Welcome back!"],
        outcome: Some(stop_outcome("Welcome back!")),
    });

    let (ctx, _handle) = context(&h, "ava");
    h.orchestrator
        .respond(
            Content::text("The user just joined; greet them."),
            &ctx,
            RespondOptions {
                proactive: true,
                tts: None,
            },
        )
        .await
        .unwrap();

    let history = h.transcripts.history_for("u1", "ava").await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].role, Role::Assistant);
    let _ = collect(&mut h.events_rx, 3).await;
}

#[tokio::test]
async fn interruption_reply_uses_fallback_when_llm_fails() {
    let h = harness(Duration::from_secs(30), false);
    // No short reply scripted: complete_short errors, fallback set used.
    let reply = h
        .orchestrator
        .interruption_reply("ava", avatar_core::InterruptionKind::DuringSpeech)
        .await;
    assert!(["Oh, sorry!", "Oops!", "My bad!", "Sorry!", "Oh!"].contains(&reply.as_str()));
}

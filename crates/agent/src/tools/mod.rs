//! Tool catalog and dispatch
//!
//! Declarative catalog keyed by tool name. Which tools a turn offers
//! depends on the persona category and feature flags; dispatch happens
//! inside the orchestrator on a `tool_calls` finish. Unknown tool names
//! are ignored and the turn falls through as if no tool call occurred.

pub mod products;
pub mod style;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use avatar_config::FeatureFlags;
use avatar_core::{EventSender, Persona};
use avatar_llm::{ToolDefinition, ToolInvocation};

/// Per-dispatch context handed to handlers.
#[derive(Clone)]
pub struct ToolCallContext {
    pub session_id: String,
    /// Present only for live call sessions; tools that act on the call
    /// require it.
    pub call_session_id: Option<String>,
    pub persona: Arc<Persona>,
    pub events: EventSender,
    /// Assistant text streamed before the tool call fired.
    pub lead_in_text: String,
    /// Resolved input image for vision-dependent tools (vision slot if
    /// fresh, else the most recent image in history).
    pub input_image_url: Option<String>,
}

/// Result of one dispatch.
#[derive(Debug, Default)]
pub struct ToolReply {
    /// Overrides the assistant text emitted and persisted for the turn.
    pub text: Option<String>,
    /// The handler already emitted the turn's terminal
    /// `llm_response_complete`.
    pub terminal_emitted: bool,
}

impl ToolReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            terminal_emitted: false,
        }
    }
}

/// One registered tool.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn name(&self) -> &'static str;

    fn definition(&self) -> ToolDefinition;

    /// Whether this tool is offered to the model for the given persona and
    /// feature flags.
    fn available(&self, persona: &Persona, features: &FeatureFlags) -> bool;

    async fn handle(&self, invocation: ToolInvocation, ctx: &ToolCallContext) -> ToolReply;
}

/// Tool registry
#[derive(Default)]
pub struct ToolRegistry {
    handlers: HashMap<&'static str, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) {
        self.handlers.insert(handler.name(), handler);
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Definitions offered for this turn.
    pub fn definitions_for(&self, persona: &Persona, features: &FeatureFlags) -> Vec<ToolDefinition> {
        let mut definitions: Vec<ToolDefinition> = self
            .handlers
            .values()
            .filter(|handler| handler.available(persona, features))
            .map(|handler| handler.definition())
            .collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    /// Dispatch one finalized call. `None` means the name is unknown and
    /// the caller proceeds as if no tool call occurred.
    pub async fn dispatch(
        &self,
        invocation: ToolInvocation,
        ctx: &ToolCallContext,
    ) -> Option<ToolReply> {
        match self.handlers.get(invocation.name.as_str()) {
            Some(handler) => Some(handler.handle(invocation, ctx).await),
            None => {
                tracing::debug!(tool = %invocation.name, "unknown tool name ignored");
                None
            }
        }
    }
}

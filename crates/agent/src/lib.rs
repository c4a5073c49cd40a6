//! Conversation orchestration
//!
//! One `Orchestrator` per process drives every turn: assemble prompt and
//! cross-session history, stream the completion, fan the response out to
//! the client and the TTS sink, dispatch tool calls, and persist the
//! transcript. Per-session state (purchase funnel, interrupt coordinator,
//! vision slot) is passed in through the turn context.

pub mod history;
pub mod orchestrator;
pub mod persona_store;
pub mod prompt;
pub mod purchase;
pub mod tools;

pub use history::assemble;
pub use orchestrator::{Orchestrator, RespondOptions, TurnContext, FALLBACK_APOLOGY};
pub use persona_store::{HttpPersonaSource, PersonaSource, PersonaStore, StaticPersonaSource};
pub use purchase::{PurchaseFlowEntry, PurchaseFlowTracker};
pub use tools::products::{HttpProductCatalog, ProductCatalog, StaticProductCatalog};
pub use tools::{ToolHandler, ToolRegistry, ToolReply};

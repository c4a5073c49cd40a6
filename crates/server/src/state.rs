//! Application state
//!
//! Shared wiring across all handlers: configuration, the session table,
//! the process-wide orchestrator, and the persistence stores.

use std::sync::Arc;
use std::time::Duration;

use avatar_agent::tools::products::TrendingProductsTool;
use avatar_agent::tools::style::StyleSuggestionTool;
use avatar_agent::{
    HttpPersonaSource, HttpProductCatalog, Orchestrator, PersonaStore, PurchaseFlowTracker,
    StaticPersonaSource, StaticProductCatalog, ToolRegistry,
};
use avatar_config::Settings;
use avatar_core::{Persona, PersonaCategory};
use avatar_imagegen::{FalStyleClient, HttpObjectStore, ObjectStore};
use avatar_llm::{ChatBackend, OpenAiChatClient};
use avatar_persistence::{SessionRecordStore, StyleGenerationStore, TranscriptStore};

use crate::session::SessionManager;
use crate::ServerError;

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub sessions: Arc<SessionManager>,
    pub personas: Arc<PersonaStore>,
    pub orchestrator: Arc<Orchestrator>,
    pub purchases: Arc<PurchaseFlowTracker>,
    pub session_records: Arc<dyn SessionRecordStore>,
}

impl AppState {
    /// Wire the full pipeline against the given stores.
    pub fn build(
        settings: Settings,
        transcripts: Arc<dyn TranscriptStore>,
        styles: Arc<dyn StyleGenerationStore>,
        session_records: Arc<dyn SessionRecordStore>,
    ) -> Result<Self, ServerError> {
        let llm: Arc<dyn ChatBackend> = Arc::new(
            OpenAiChatClient::new(settings.llm.clone())
                .map_err(|e| ServerError::Internal(e.to_string()))?,
        );

        let personas = Arc::new(if settings.personas.endpoint.is_empty() {
            tracing::warn!("no persona endpoint configured, using built-in demo personas");
            PersonaStore::new(Arc::new(StaticPersonaSource::new(demo_personas())))
        } else {
            PersonaStore::new(Arc::new(HttpPersonaSource::new(settings.personas.clone())))
        });

        let object_store: Arc<dyn ObjectStore> =
            Arc::new(HttpObjectStore::new(settings.storage.clone()));
        let generator = Arc::new(FalStyleClient::new(settings.imagegen.clone(), object_store));

        let purchases = Arc::new(PurchaseFlowTracker::new());

        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(StyleSuggestionTool::new(
            generator,
            styles,
            llm.clone(),
        )));
        if settings.features.product_purchase {
            let catalog: Arc<dyn avatar_agent::ProductCatalog> =
                if settings.products.endpoint.is_empty() {
                    tracing::warn!("product purchase enabled without a catalog endpoint");
                    Arc::new(StaticProductCatalog::new(Vec::new()))
                } else {
                    Arc::new(HttpProductCatalog::new(settings.products.clone()))
                };
            registry.register(Arc::new(TrendingProductsTool::new(catalog, purchases.clone())));
        }

        let orchestrator = Arc::new(Orchestrator::new(
            llm,
            personas.clone(),
            transcripts,
            registry,
            purchases.clone(),
            settings.features.clone(),
            Duration::from_secs(settings.llm.turn_timeout_secs),
        ));

        let sessions = Arc::new(SessionManager::with_config(
            settings.server.max_sessions,
            Duration::from_secs(settings.server.session_timeout_secs),
            Duration::from_secs(settings.server.cleanup_interval_secs),
        ));

        Ok(Self {
            settings: Arc::new(settings),
            sessions,
            personas,
            orchestrator,
            purchases,
            session_records,
        })
    }
}

/// Built-in personas for development runs without an upstream store.
fn demo_personas() -> Vec<Persona> {
    vec![
        Persona {
            id: "aria".to_string(),
            display_name: "Aria".to_string(),
            category: PersonaCategory::Generic,
            system_prompt: "You are Aria, a warm, concise conversational companion. Keep \
                            answers short enough to speak aloud."
                .to_string(),
            voice_id: None,
            reference_outfits: Vec::new(),
            preferred_genres: Vec::new(),
            vision_capture_interval_secs: None,
            price_per_minute: None,
        },
        Persona {
            id: "sasha".to_string(),
            display_name: "Sasha".to_string(),
            category: PersonaCategory::Stylist,
            system_prompt: "You are Sasha, an upbeat personal stylist. You comment on what \
                            the user is wearing and suggest looks they can try on."
                .to_string(),
            voice_id: None,
            reference_outfits: Vec::new(),
            preferred_genres: Vec::new(),
            vision_capture_interval_secs: Some(30),
            price_per_minute: None,
        },
    ]
}

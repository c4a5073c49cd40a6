//! Persona store
//!
//! Read-through cache over an external persona source. Personas are
//! immutable within a session; there is no invalidation requirement.

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;

use avatar_config::PersonaSourceSettings;
use avatar_core::{Error, Persona, Result};

/// Backing source for persona records.
#[async_trait]
pub trait PersonaSource: Send + Sync {
    async fn fetch(&self, persona_id: &str) -> Result<Option<Persona>>;
}

/// Process-wide persona cache.
pub struct PersonaStore {
    source: Arc<dyn PersonaSource>,
    cache: DashMap<String, Arc<Persona>>,
}

impl PersonaStore {
    pub fn new(source: Arc<dyn PersonaSource>) -> Self {
        Self {
            source,
            cache: DashMap::new(),
        }
    }

    /// Look a persona up, caching on first hit.
    pub async fn lookup(&self, persona_id: &str) -> Result<Arc<Persona>> {
        if let Some(persona) = self.cache.get(persona_id) {
            return Ok(persona.clone());
        }
        match self.source.fetch(persona_id).await? {
            Some(persona) => {
                let persona = Arc::new(persona);
                self.cache.insert(persona_id.to_string(), persona.clone());
                Ok(persona)
            }
            None => Err(Error::PersonaMissing(persona_id.to_string())),
        }
    }
}

/// REST-backed persona source.
pub struct HttpPersonaSource {
    client: Client,
    settings: PersonaSourceSettings,
}

impl HttpPersonaSource {
    pub fn new(settings: PersonaSourceSettings) -> Self {
        Self {
            client: Client::new(),
            settings,
        }
    }
}

#[async_trait]
impl PersonaSource for HttpPersonaSource {
    async fn fetch(&self, persona_id: &str) -> Result<Option<Persona>> {
        let url = format!(
            "{}/personas/{}",
            self.settings.endpoint.trim_end_matches('/'),
            persona_id
        );
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.settings.api_key)
            .send()
            .await
            .map_err(|e| Error::Upstream(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Error::Upstream(format!(
                "persona fetch failed: HTTP {}",
                response.status()
            )));
        }
        let persona = response
            .json::<Persona>()
            .await
            .map_err(|e| Error::Upstream(e.to_string()))?;
        Ok(Some(persona))
    }
}

/// Fixed in-process source for development and tests.
pub struct StaticPersonaSource {
    personas: HashMap<String, Persona>,
}

impl StaticPersonaSource {
    pub fn new(personas: Vec<Persona>) -> Self {
        Self {
            personas: personas.into_iter().map(|p| (p.id.clone(), p)).collect(),
        }
    }
}

#[async_trait]
impl PersonaSource for StaticPersonaSource {
    async fn fetch(&self, persona_id: &str) -> Result<Option<Persona>> {
        Ok(self.personas.get(persona_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avatar_core::PersonaCategory;

    fn persona(id: &str) -> Persona {
        Persona {
            id: id.to_string(),
            display_name: "Test".to_string(),
            category: PersonaCategory::Generic,
            system_prompt: "You are helpful.".to_string(),
            voice_id: None,
            reference_outfits: Vec::new(),
            preferred_genres: Vec::new(),
            vision_capture_interval_secs: None,
            price_per_minute: None,
        }
    }

    #[tokio::test]
    async fn lookup_caches_and_misses() {
        let store = PersonaStore::new(Arc::new(StaticPersonaSource::new(vec![persona("p1")])));

        let found = store.lookup("p1").await.unwrap();
        assert_eq!(found.id, "p1");
        assert!(store.cache.contains_key("p1"));

        let missing = store.lookup("nope").await;
        assert!(matches!(missing, Err(Error::PersonaMissing(_))));
    }
}

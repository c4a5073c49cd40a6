//! Persona definitions
//!
//! A persona is the named agent configuration selected for a session:
//! prompt, voice, category, and optional assets. Immutable once loaded.

use serde::{Deserialize, Serialize};

/// Persona category; drives tool availability and prompt directives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PersonaCategory {
    Stylist,
    Producer,
    Fitness,
    #[default]
    Generic,
}

/// A named, imaged garment attached to a stylist persona, selectable by
/// the style tool for virtual try-on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceOutfit {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub brand: String,
    pub image_url: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub description: String,
}

/// Persona record as served by the persona store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Persona {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub category: PersonaCategory,
    pub system_prompt: String,
    #[serde(default)]
    pub voice_id: Option<String>,
    #[serde(default)]
    pub reference_outfits: Vec<ReferenceOutfit>,
    #[serde(default)]
    pub preferred_genres: Vec<String>,
    /// Seconds between automatic vision captures, when the client supports
    /// them.
    #[serde(default)]
    pub vision_capture_interval_secs: Option<u64>,
    #[serde(default)]
    pub price_per_minute: Option<f64>,
}

impl Persona {
    pub fn is_stylist(&self) -> bool {
        self.category == PersonaCategory::Stylist
    }
}

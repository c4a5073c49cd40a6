//! System prompt assembly

use avatar_core::{Persona, PersonaCategory};

use crate::purchase::{self, PurchaseFlowEntry};

/// Build the turn's system prompt: persona prompt, purchase-flow context,
/// and the stylist directive block when applicable.
pub fn build_system_prompt(persona: &Persona, purchase_entry: &PurchaseFlowEntry) -> String {
    let mut prompt = persona.system_prompt.trim().to_string();

    if let Some(paragraph) = purchase::guidance(purchase_entry) {
        prompt.push_str("\n\n");
        prompt.push_str(&paragraph);
    }

    if persona.category == PersonaCategory::Producer && !persona.preferred_genres.is_empty() {
        prompt.push_str(&format!(
            "\n\nYour preferred genres are {}.",
            persona.preferred_genres.join(", ")
        ));
    }

    if persona.is_stylist() {
        prompt.push_str("\n\n");
        prompt.push_str(STYLIST_DIRECTIVE);
        if !persona.reference_outfits.is_empty() {
            prompt.push_str("\n\nReference outfits available for virtual try-on:\n");
            for (index, outfit) in persona.reference_outfits.iter().enumerate() {
                prompt.push_str(&format!(
                    "{}. {} by {}{}\n",
                    index,
                    outfit.name,
                    if outfit.brand.is_empty() {
                        "an unknown brand"
                    } else {
                        outfit.brand.as_str()
                    },
                    if outfit.tags.is_empty() {
                        String::new()
                    } else {
                        format!(" ({})", outfit.tags.join(", "))
                    }
                ));
            }
            prompt.push_str(
                "When the user names one of these outfits, a brand, or asks to try one on, call \
                 generate_style_suggestion with use_reference_outfit set to true and pass \
                 reference_outfit_index when you can tell which one they mean. For any other \
                 look, leave use_reference_outfit false and describe the look in \
                 suggestion_prompt.",
            );
        }
    }

    prompt
}

const STYLIST_DIRECTIVE: &str = "\
Whenever the user expresses any intent to see a different look on themselves — a new outfit, \
color, accessory, or any visual change, including short confirmations such as \"now?\", \"go \
ahead\", \"yes do it\" — you must call the generate_style_suggestion tool rather than only \
describing the look in words. Keep the text you say before the tool call to one short sentence.";

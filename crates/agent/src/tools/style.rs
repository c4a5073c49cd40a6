//! Style-suggestion tool
//!
//! Runs the full try-on/edit flow: pick the input image, resolve a
//! reference outfit when asked for one, emit the interim "feedback"
//! complete, then generate in the background and push the "completion"
//! event with the persisted image URL.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use avatar_config::FeatureFlags;
use avatar_core::{
    ClientEvent, Persona, ReferenceOutfit, StyleGenerationKind, StyleGenerationPayload,
};
use avatar_imagegen::{StyleGenerator, StyleRequest};
use avatar_llm::{ChatBackend, ToolDefinition, ToolInvocation};
use avatar_persistence::{now_ms, StyleGenerationRecord, StyleGenerationStore};

use super::{ToolCallContext, ToolHandler, ToolReply};

const DEFAULT_LEAD_IN: &str = "Give me a moment, I'm putting that look together for you now.";
const CELEBRATION_FALLBACK: &str = "Here's your new look, I love how it came together!";
const NEED_OUTFIT_REPLY: &str =
    "I need to see your current outfit first. Could you step in front of the camera for a second?";

#[derive(Debug, Default, Deserialize)]
struct StyleArgs {
    #[serde(default)]
    suggestion_prompt: String,
    #[serde(default)]
    use_reference_outfit: bool,
    #[serde(default)]
    reference_outfit_index: Option<usize>,
}

/// `generate_style_suggestion`
pub struct StyleSuggestionTool {
    generator: Arc<dyn StyleGenerator>,
    styles: Arc<dyn StyleGenerationStore>,
    llm: Arc<dyn ChatBackend>,
}

impl StyleSuggestionTool {
    pub fn new(
        generator: Arc<dyn StyleGenerator>,
        styles: Arc<dyn StyleGenerationStore>,
        llm: Arc<dyn ChatBackend>,
    ) -> Self {
        Self {
            generator,
            styles,
            llm,
        }
    }
}

#[async_trait]
impl ToolHandler for StyleSuggestionTool {
    fn name(&self) -> &'static str {
        "generate_style_suggestion"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: "Generate an image of the user wearing a suggested look. Call this for \
                          any request to see a different outfit, color, or style on the user."
                .to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "suggestion_prompt": {
                        "type": "string",
                        "description": "Description of the suggested look"
                    },
                    "use_reference_outfit": {
                        "type": "boolean",
                        "description": "True when one of the persona's reference outfits should be tried on"
                    },
                    "reference_outfit_index": {
                        "type": "integer",
                        "description": "Index into the reference outfit list, when known"
                    }
                },
                "required": ["suggestion_prompt", "use_reference_outfit"]
            }),
        }
    }

    fn available(&self, persona: &Persona, _features: &FeatureFlags) -> bool {
        persona.is_stylist()
    }

    async fn handle(&self, invocation: ToolInvocation, ctx: &ToolCallContext) -> ToolReply {
        let args: StyleArgs = serde_json::from_value(invocation.arguments).unwrap_or_default();

        if !ctx.persona.is_stylist() || ctx.call_session_id.is_none() {
            return ToolReply::text(
                "Style suggestions are only available during a live styling session.",
            );
        }
        let Some(image_url) = ctx.input_image_url.clone() else {
            return ToolReply::text(NEED_OUTFIT_REPLY);
        };

        let reference_image_urls = if args.use_reference_outfit
            && !ctx.persona.reference_outfits.is_empty()
        {
            let index = select_reference_outfit(
                &args.suggestion_prompt,
                args.reference_outfit_index,
                &ctx.persona.reference_outfits,
            );
            vec![ctx.persona.reference_outfits[index].image_url.clone()]
        } else {
            Vec::new()
        };

        let generating_message_id = uuid::Uuid::new_v4().to_string();
        let lead_in = if ctx.lead_in_text.trim().is_empty() {
            DEFAULT_LEAD_IN.to_string()
        } else {
            ctx.lead_in_text.clone()
        };

        // Interim terminal event: the client shows generation feedback
        // while the image renders.
        ctx.events
            .emit(ClientEvent::LlmResponseComplete {
                full_response: lead_in.clone(),
                avatar_id: ctx.persona.id.clone(),
                complete: true,
                style_generation: Some(StyleGenerationPayload {
                    kind: StyleGenerationKind::Feedback,
                    generating_message_id: generating_message_id.clone(),
                    prompt: Some(args.suggestion_prompt.clone()),
                    image_url: None,
                    description: None,
                }),
            })
            .await;

        let request = StyleRequest {
            image_url,
            prompt: args.suggestion_prompt.clone(),
            session_id: ctx.session_id.clone(),
            persona_id: ctx.persona.id.clone(),
            reference_image_urls,
        };

        // The generation finishes out-of-band; the turn is already
        // terminal once the feedback event is out.
        let generator = self.generator.clone();
        let styles = self.styles.clone();
        let llm = self.llm.clone();
        let events = ctx.events.clone();
        let avatar_id = ctx.persona.id.clone();
        let persona_name = ctx.persona.display_name.clone();
        let prompt = args.suggestion_prompt.clone();
        tokio::spawn(async move {
            match generator.generate_style(request.clone()).await {
                Ok(output) => {
                    let record = StyleGenerationRecord {
                        session_id: request.session_id.clone(),
                        persona_id: request.persona_id.clone(),
                        original_url: request.image_url.clone(),
                        generated_url: output.generated_url.clone(),
                        prompt: prompt.clone(),
                        created_at_ms: now_ms(),
                    };
                    if let Err(e) = styles.record(record).await {
                        tracing::warn!(error = %e, "style-generation record not persisted");
                    }

                    let celebration = llm
                        .complete_short(
                            &format!(
                                "You are {persona_name}, a personal stylist. Reply with one \
                                 short, excited sentence."
                            ),
                            &format!(
                                "The generated look is ready: {prompt}. Tell the user to check \
                                 it out."
                            ),
                            60,
                        )
                        .await
                        .ok()
                        .filter(|text| !text.is_empty())
                        .unwrap_or_else(|| CELEBRATION_FALLBACK.to_string());

                    events
                        .emit(ClientEvent::LlmResponseComplete {
                            full_response: celebration,
                            avatar_id,
                            complete: true,
                            style_generation: Some(StyleGenerationPayload {
                                kind: StyleGenerationKind::Completion,
                                generating_message_id,
                                prompt: None,
                                image_url: Some(output.generated_url),
                                description: Some(prompt),
                            }),
                        })
                        .await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "style generation failed");
                    events
                        .emit(ClientEvent::StyleSuggestionError {
                            avatar_id,
                            error: e.to_string(),
                        })
                        .await;
                }
            }
        });

        ToolReply {
            text: Some(lead_in),
            terminal_emitted: true,
        }
    }
}

/// Pick a reference outfit: explicit index when in range, else fuzzy match
/// of the prompt against brand (highest), name, tags, then description
/// words, else the first outfit.
pub fn select_reference_outfit(
    prompt: &str,
    index: Option<usize>,
    outfits: &[ReferenceOutfit],
) -> usize {
    if let Some(index) = index {
        if index < outfits.len() {
            return index;
        }
    }

    let prompt = prompt.to_lowercase();
    let mut best = (0usize, 0u32);
    for (index, outfit) in outfits.iter().enumerate() {
        let mut score = 0u32;
        if !outfit.brand.is_empty() && prompt.contains(&outfit.brand.to_lowercase()) {
            score += 100;
        }
        if !outfit.name.is_empty() && prompt.contains(&outfit.name.to_lowercase()) {
            score += 50;
        }
        for tag in &outfit.tags {
            if prompt.contains(&tag.to_lowercase()) {
                score += 10;
            }
        }
        for word in outfit.description.split_whitespace() {
            if word.len() > 3 && prompt.contains(&word.to_lowercase()) {
                score += 1;
            }
        }
        if score > best.1 {
            best = (index, score);
        }
    }
    best.0
}

//! Conversation messages
//!
//! Content is a tagged variant: plain text or an ordered list of parts
//! (text and image). Rows read back from the transcript store may still
//! carry legacy object-shaped content; `Content::from_stored` rewrites
//! those into their documented string forms.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Literal substituted for image parts stripped from assembled history.
pub const IMAGE_REMOVED_PLACEHOLDER: &str = "[Image content removed from history]";

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// One element of a multi-part message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Part {
    Text { text: String },
    Image { url: String },
}

/// Message content: plain text or an ordered list of parts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Parts(Vec<Part>),
}

impl Content {
    pub fn text(text: impl Into<String>) -> Self {
        Content::Text(text.into())
    }

    /// Text + image pair, the shape produced for vision-bearing turns.
    pub fn with_image(text: impl Into<String>, image_url: impl Into<String>) -> Self {
        Content::Parts(vec![
            Part::Text { text: text.into() },
            Part::Image {
                url: image_url.into(),
            },
        ])
    }

    /// Whether any part carries an image.
    pub fn has_image(&self) -> bool {
        match self {
            Content::Text(_) => false,
            Content::Parts(parts) => parts.iter().any(|p| matches!(p, Part::Image { .. })),
        }
    }

    /// URL of the first image part, if present.
    pub fn image_url(&self) -> Option<&str> {
        match self {
            Content::Text(_) => None,
            Content::Parts(parts) => parts.iter().find_map(|p| match p {
                Part::Image { url } => Some(url.as_str()),
                Part::Text { .. } => None,
            }),
        }
    }

    /// Concatenated text of all text parts.
    pub fn text_content(&self) -> String {
        match self {
            Content::Text(text) => text.clone(),
            Content::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    Part::Text { text } => Some(text.as_str()),
                    Part::Image { .. } => None,
                })
                .collect::<Vec<_>>()
                .join(" "),
        }
    }

    /// Replace image-bearing content with its text part, or with the
    /// removal placeholder when no text accompanied the image.
    pub fn strip_image(&self) -> Content {
        if !self.has_image() {
            return self.clone();
        }
        let text = self.text_content();
        if text.trim().is_empty() {
            Content::Text(IMAGE_REMOVED_PLACEHOLDER.to_string())
        } else {
            Content::Text(text)
        }
    }

    /// Normalize a stored content value.
    ///
    /// Strings and part lists pass through; legacy object-shaped rows are
    /// rewritten to their documented string forms, unknown shapes become a
    /// `[System event: …]` marker.
    pub fn from_stored(value: &Value) -> Content {
        match value {
            Value::String(s) => Content::Text(s.clone()),
            Value::Array(_) => match serde_json::from_value::<Vec<Part>>(value.clone()) {
                Ok(parts) => Content::Parts(parts),
                Err(_) => Content::Text(value.to_string()),
            },
            Value::Object(map) => {
                let kind = map.get("type").and_then(Value::as_str);
                let data = map.get("data").cloned().unwrap_or(Value::Null);
                let text = match kind {
                    Some("workout_plan") => format!("Workout plan generated: {}", data),
                    Some("performance_analysis") => {
                        format!("Performance analysis generated: {}", data)
                    }
                    Some("exercise_event") => format!("Exercise event: {}", data),
                    Some(other) => format!("[System event: {}]", other),
                    None => "[System event: unknown]".to_string(),
                };
                Content::Text(text)
            }
            other => Content::Text(other.to_string()),
        }
    }
}

/// A transcript entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Content,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: Content::text(text),
        }
    }

    pub fn user(content: Content) -> Self {
        Self {
            role: Role::User,
            content,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Content::text(text),
        }
    }
}

/// A raw transcript row as returned by the transcript store.
///
/// Content is kept as raw JSON; normalization happens on read via
/// `Content::from_stored` so legacy rows survive in storage untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub role: Role,
    pub content: Value,
}

impl From<&Message> for StoredMessage {
    fn from(msg: &Message) -> Self {
        Self {
            role: msg.role,
            content: serde_json::to_value(&msg.content).unwrap_or(Value::Null),
        }
    }
}

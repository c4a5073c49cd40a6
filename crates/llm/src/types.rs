//! Request/response types and wire conversion
//!
//! Conversation messages use the core content model; conversion to the
//! provider's content shape (string or text/image_url part list) happens
//! here so the rest of the pipeline never sees provider JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use avatar_core::{Content, Message, Part, Role};

/// A tool the model may call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema object for the arguments.
    pub parameters: Value,
}

/// A finalized tool call extracted from the stream.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// Why the stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    ToolCalls,
    Length,
    Cancelled,
}

impl FinishReason {
    pub fn parse(s: &str) -> Self {
        match s {
            "tool_calls" => FinishReason::ToolCalls,
            "length" => FinishReason::Length,
            _ => FinishReason::Stop,
        }
    }
}

/// One streaming completion request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
}

impl ChatRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            tools: Vec::new(),
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }
}

/// Terminal result of one completion stream.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub text: String,
    pub tool_call: Option<ToolInvocation>,
    pub finish: FinishReason,
}

/// Events delivered while a completion streams.
#[derive(Debug)]
pub enum ChatEvent {
    /// A text delta, in stream order.
    Delta(String),
    /// The stream finished normally.
    Done(ChatOutcome),
    /// The stream failed.
    Error(crate::LlmError),
}

// ---------------------------------------------------------------------------
// Provider wire types (OpenAI-compatible)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub(crate) struct WireRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<WireTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<&'static str>,
}

#[derive(Debug, Serialize)]
pub(crate) struct WireMessage {
    pub role: String,
    pub content: Value,
}

impl From<&Message> for WireMessage {
    fn from(msg: &Message) -> Self {
        let content = match &msg.content {
            Content::Text(text) => Value::String(text.clone()),
            Content::Parts(parts) => Value::Array(
                parts
                    .iter()
                    .map(|part| match part {
                        Part::Text { text } => serde_json::json!({
                            "type": "text",
                            "text": text,
                        }),
                        Part::Image { url } => serde_json::json!({
                            "type": "image_url",
                            "image_url": {"url": url},
                        }),
                    })
                    .collect(),
            ),
        };
        Self {
            role: match msg.role {
                Role::System => "system".to_string(),
                Role::User => "user".to_string(),
                Role::Assistant => "assistant".to_string(),
            },
            content,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct WireTool {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub function: WireFunction,
}

#[derive(Debug, Serialize)]
pub(crate) struct WireFunction {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl From<&ToolDefinition> for WireTool {
    fn from(tool: &ToolDefinition) -> Self {
        Self {
            kind: "function",
            function: WireFunction {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: tool.parameters.clone(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireStreamChunk {
    pub choices: Vec<WireStreamChoice>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireStreamChoice {
    #[serde(default)]
    pub delta: Option<WireDelta>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireDelta {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<WireToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireToolCallDelta {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub function: Option<WireFunctionDelta>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireFunctionDelta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireResponse {
    pub choices: Vec<WireResponseChoice>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireResponseChoice {
    pub message: WireResponseMessage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_message_serializes_as_string_content() {
        let msg = Message::user(Content::text("Hello"));
        let wire = WireMessage::from(&msg);
        assert_eq!(wire.role, "user");
        assert_eq!(wire.content, Value::String("Hello".to_string()));
    }

    #[test]
    fn image_message_serializes_as_part_list() {
        let msg = Message::user(Content::with_image("does this suit me?", "https://img/1.jpg"));
        let wire = WireMessage::from(&msg);
        let parts = wire.content.as_array().unwrap();
        assert_eq!(parts[0]["type"], "text");
        assert_eq!(parts[1]["type"], "image_url");
        assert_eq!(parts[1]["image_url"]["url"], "https://img/1.jpg");
    }

    #[test]
    fn finish_reason_parse() {
        assert_eq!(FinishReason::parse("stop"), FinishReason::Stop);
        assert_eq!(FinishReason::parse("tool_calls"), FinishReason::ToolCalls);
        assert_eq!(FinishReason::parse("length"), FinishReason::Length);
        assert_eq!(FinishReason::parse("unknown"), FinishReason::Stop);
    }
}

//! OpenAI-compatible chat client
//!
//! SSE stream consumption follows the line-framed pattern shared by every
//! backend in this workspace: buffer raw bytes, split on newlines, strip
//! the `data: ` prefix, decode one chunk per line.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use std::time::Duration;
use tokio::sync::mpsc;

use avatar_config::LlmSettings;

use crate::accumulate::ToolCallAccumulator;
use crate::types::{
    ChatEvent, ChatOutcome, ChatRequest, FinishReason, WireMessage, WireRequest, WireResponse,
    WireStreamChunk, WireTool,
};
use crate::LlmError;

/// Backend seam for the orchestrator; lets tests script completions.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Start a streaming completion. Dropping the receiver cancels the
    /// stream; the producer stops at the first failed send.
    async fn stream_chat(&self, request: ChatRequest) -> Result<mpsc::Receiver<ChatEvent>, LlmError>;

    /// Bounded non-streaming completion for short secondary generations.
    async fn complete_short(
        &self,
        system: &str,
        user: &str,
        max_tokens: u32,
    ) -> Result<String, LlmError>;
}

/// Production chat client.
#[derive(Clone)]
pub struct OpenAiChatClient {
    client: Client,
    settings: LlmSettings,
}

impl OpenAiChatClient {
    pub fn new(settings: LlmSettings) -> Result<Self, LlmError> {
        if settings.api_key.is_empty() && !settings.endpoint.starts_with("http://localhost") {
            return Err(LlmError::Configuration(
                "LLM API key required for remote endpoints".to_string(),
            ));
        }
        // The request-level timeout sits above the orchestrator's 30 s turn
        // deadline so the deadline fires first and maps to UpstreamTimeout.
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.turn_timeout_secs + 15))
            .build()
            .map_err(|e| LlmError::Configuration(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client, settings })
    }

    fn chat_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.settings.endpoint.trim_end_matches('/')
        )
    }

    fn build_request(&self, request: &ChatRequest, stream: bool, max_tokens: u32) -> WireRequest {
        let tools: Vec<WireTool> = request.tools.iter().map(WireTool::from).collect();
        WireRequest {
            model: self.settings.model.clone(),
            messages: request.messages.iter().map(WireMessage::from).collect(),
            max_tokens,
            temperature: self.settings.temperature,
            presence_penalty: self.settings.presence_penalty,
            frequency_penalty: self.settings.frequency_penalty,
            stream,
            tool_choice: if tools.is_empty() { None } else { Some("auto") },
            tools: if tools.is_empty() { None } else { Some(tools) },
        }
    }
}

#[async_trait]
impl ChatBackend for OpenAiChatClient {
    async fn stream_chat(&self, request: ChatRequest) -> Result<mpsc::Receiver<ChatEvent>, LlmError> {
        let wire = self.build_request(&request, true, self.settings.max_tokens);

        let response = self
            .client
            .post(self.chat_url())
            .bearer_auth(&self.settings.api_key)
            .json(&wire)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("HTTP {status}: {error_text}")));
        }

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            let mut buffer = String::new();
            let mut full_text = String::new();
            let mut accumulator = ToolCallAccumulator::new();

            while let Some(chunk) = stream.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let _ = tx.send(ChatEvent::Error(e.into())).await;
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim().to_string();
                    buffer = buffer[line_end + 1..].to_string();

                    if line.is_empty() || line == "data: [DONE]" {
                        continue;
                    }
                    let Some(json_str) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    let Ok(chunk) = serde_json::from_str::<WireStreamChunk>(json_str) else {
                        continue;
                    };
                    let Some(choice) = chunk.choices.into_iter().next() else {
                        continue;
                    };

                    if let Some(delta) = choice.delta {
                        if let Some(content) = delta.content {
                            if !content.is_empty() {
                                full_text.push_str(&content);
                                if tx.send(ChatEvent::Delta(content)).await.is_err() {
                                    // Receiver dropped: the turn was cancelled.
                                    return;
                                }
                            }
                        }
                        for call in delta.tool_calls.unwrap_or_default() {
                            let function = call.function.as_ref();
                            accumulator.push(
                                call.id.as_deref(),
                                function.and_then(|f| f.name.as_deref()),
                                function.and_then(|f| f.arguments.as_deref()),
                            );
                        }
                    }

                    if let Some(reason) = choice.finish_reason {
                        let finish = FinishReason::parse(&reason);
                        let tool_call = if finish == FinishReason::ToolCalls {
                            accumulator.finalize()
                        } else {
                            None
                        };
                        let _ = tx
                            .send(ChatEvent::Done(ChatOutcome {
                                text: full_text,
                                tool_call,
                                finish,
                            }))
                            .await;
                        return;
                    }
                }
            }

            // Stream ended without a finish_reason frame.
            let _ = tx
                .send(ChatEvent::Error(LlmError::InvalidResponse(
                    "stream ended without finish_reason".to_string(),
                )))
                .await;
        });

        Ok(rx)
    }

    async fn complete_short(
        &self,
        system: &str,
        user: &str,
        max_tokens: u32,
    ) -> Result<String, LlmError> {
        use avatar_core::{Content, Message, Role};

        let request = ChatRequest::new(vec![
            Message::system(system),
            Message {
                role: Role::User,
                content: Content::text(user),
            },
        ]);
        let wire = self.build_request(&request, false, max_tokens);

        let response = self
            .client
            .post(self.chat_url())
            .bearer_auth(&self.settings.api_key)
            .json(&wire)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("HTTP {status}: {error_text}")));
        }

        let response: WireResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|text| text.trim().to_string())
            .ok_or_else(|| LlmError::InvalidResponse("no choices in response".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avatar_core::{Content, Message};
    use crate::types::ToolDefinition;

    fn settings() -> LlmSettings {
        LlmSettings {
            api_key: "sk-test".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn requires_api_key_for_remote_endpoint() {
        let client = OpenAiChatClient::new(LlmSettings::default());
        assert!(client.is_err());
    }

    #[test]
    fn tool_choice_only_set_with_tools() {
        let client = OpenAiChatClient::new(settings()).unwrap();

        let bare = ChatRequest::new(vec![Message::user(Content::text("hi"))]);
        let wire = client.build_request(&bare, true, 500);
        assert!(wire.tools.is_none());
        assert!(wire.tool_choice.is_none());

        let with_tools = bare.clone().with_tools(vec![ToolDefinition {
            name: "get_trending_products".to_string(),
            description: "Fetch trending products".to_string(),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
        }]);
        let wire = client.build_request(&with_tools, true, 500);
        assert_eq!(wire.tool_choice, Some("auto"));
        assert_eq!(wire.tools.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn sampling_parameters_from_settings() {
        let client = OpenAiChatClient::new(settings()).unwrap();
        let wire = client.build_request(
            &ChatRequest::new(vec![Message::user(Content::text("hi"))]),
            true,
            500,
        );
        assert_eq!(wire.temperature, 0.7);
        assert_eq!(wire.max_tokens, 500);
        assert_eq!(wire.presence_penalty, 0.1);
        assert_eq!(wire.frequency_penalty, 0.1);
        assert!(wire.stream);
    }
}

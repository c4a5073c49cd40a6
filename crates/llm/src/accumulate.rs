//! Tool-call delta accumulation
//!
//! The provider streams a tool call as fragments: the function name
//! arrives once (first non-empty wins), the arguments as concatenated JSON
//! pieces. The accumulator finalizes at `finish_reason = tool_calls`; a
//! malformed argument buffer containing a `}{` boundary is salvaged by
//! parsing the first balanced object and discarding the rest.

use serde_json::Value;

use crate::types::ToolInvocation;

/// Small state machine over tool-call stream fragments.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    name: String,
    id: String,
    args_buffer: String,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one stream fragment into the accumulator.
    pub fn push(&mut self, id: Option<&str>, name: Option<&str>, arguments: Option<&str>) {
        if self.id.is_empty() {
            if let Some(id) = id {
                if !id.is_empty() {
                    self.id = id.to_string();
                }
            }
        }
        if self.name.is_empty() {
            if let Some(name) = name {
                if !name.is_empty() {
                    self.name = name.to_string();
                }
            }
        }
        if let Some(fragment) = arguments {
            self.args_buffer.push_str(fragment);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
    }

    /// Produce the finalized call, or `None` when no tool call was seen or
    /// the arguments were unsalvageable (treated as no call).
    pub fn finalize(self) -> Option<ToolInvocation> {
        if self.name.is_empty() {
            return None;
        }
        let arguments = if self.args_buffer.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            match salvage_first_object(&self.args_buffer) {
                Some(value) => value,
                None => {
                    tracing::warn!(
                        tool = %self.name,
                        buffer = %self.args_buffer,
                        "unsalvageable tool-call arguments, treating as no tool call"
                    );
                    return None;
                }
            }
        };
        Some(ToolInvocation {
            id: self.id,
            name: self.name,
            arguments,
        })
    }
}

/// Parse a JSON object, salvaging concatenated objects (`{…}{…}`) by
/// taking the first balanced one.
pub fn salvage_first_object(raw: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(raw) {
        return Some(value);
    }
    let boundary = raw.find("}{")?;
    match serde_json::from_str::<Value>(&raw[..=boundary]) {
        Ok(value) => {
            tracing::warn!("malformed tool-call arguments salvaged at object boundary");
            Some(value)
        }
        Err(_) => None,
    }
}

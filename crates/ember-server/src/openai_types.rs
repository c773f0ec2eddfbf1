//! OpenAI-compatible API types
//!
//! Request and response bodies for /v1/chat/completions, plus the bodies of
//! the direct tool endpoints.

use ember_agent::{Message, Role, StreamEvent, ToolDeclaration};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Request body for /v1/chat/completions endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    /// Model identifier; the configured default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Messages in the conversation
    pub messages: Vec<Message>,
    /// Whether to stream the reply as server-sent events
    #[serde(default)]
    pub stream: bool,
}

/// Role and content of a reply message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceMessage {
    pub role: Role,
    pub content: String,
}

impl From<Message> for ChoiceMessage {
    fn from(message: Message) -> Self {
        Self {
            role: message.role,
            content: message.content,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
}

/// Response body for a non-streaming completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    pub choices: Vec<Choice>,
    pub model: String,
}

impl ChatCompletionResponse {
    pub fn new(model: impl Into<String>, message: Message) -> Self {
        Self {
            choices: vec![Choice {
                message: message.into(),
            }],
            model: model.into(),
        }
    }
}

/// One streamed choice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkChoice {
    pub delta: ChoiceMessage,
    pub finish_reason: Option<String>,
}

/// Payload of one streamed `data:` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    pub choices: Vec<ChunkChoice>,
}

/// Payload of the in-band error event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamError {
    pub error: String,
}

/// Terminal line of every event stream
pub const SSE_DONE: &str = "data: [DONE]\n\n";

/// Render a stream event as one SSE frame
pub fn sse_frame(event: StreamEvent) -> String {
    let payload = match event {
        StreamEvent::Delta {
            role,
            content,
            finish_reason,
        } => serde_json::to_string(&ChatCompletionChunk {
            choices: vec![ChunkChoice {
                delta: ChoiceMessage { role, content },
                finish_reason,
            }],
        }),
        StreamEvent::Error(error) => serde_json::to_string(&StreamError { error }),
        StreamEvent::Done => return SSE_DONE.to_string(),
    };

    match payload {
        Ok(json) => format!("data: {}\n\n", json),
        Err(e) => {
            tracing::error!("Failed to encode stream event: {}", e);
            "data: {\"error\":\"failed to encode stream event\"}\n\n".to_string()
        }
    }
}

/// Request body for /tools/call
#[derive(Debug, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub tool: String,
    #[serde(default)]
    pub input: JsonValue,
}

/// Response body for /tools/call
#[derive(Debug, Serialize, Deserialize)]
pub struct ToolCallResponse {
    pub tool: String,
    pub output: String,
    pub is_error: bool,
}

/// Tool entry of the manifest
#[derive(Debug, Serialize, Deserialize)]
pub struct ManifestTool {
    pub name: String,
    pub description: String,
    pub input_schema: JsonValue,
}

impl From<&ToolDeclaration> for ManifestTool {
    fn from(declaration: &ToolDeclaration) -> Self {
        Self {
            name: declaration.name.clone(),
            description: declaration.description.clone(),
            input_schema: declaration.parameters.clone(),
        }
    }
}

/// Response body for /.well-known/mcp/manifest
#[derive(Debug, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,
    pub version: String,
    pub tools: Vec<ManifestTool>,
}

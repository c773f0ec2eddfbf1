//! Transcript management for the conversation loop
//!
//! A [`Transcript`] is the ordered message history of one request. It is
//! append-only: messages are pushed in the order they happen and are never
//! reordered or removed.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

/// Role of a message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompt
    System,
    /// User message
    User,
    /// Assistant (model) message
    Assistant,
    /// Result of a tool invocation
    Tool,
}

/// The function part of a tool call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Name of the tool to invoke; models occasionally omit it or send a non-string
    #[serde(default, deserialize_with = "string_or_none", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Arguments, either a JSON object or JSON-encoded text
    #[serde(default)]
    pub arguments: JsonValue,
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Missing or malformed function parts decode as an empty call
    #[serde(default, deserialize_with = "lenient_function")]
    pub function: FunctionCall,
}

fn string_or_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match JsonValue::deserialize(deserializer)? {
        JsonValue::String(name) => Ok(Some(name)),
        _ => Ok(None),
    }
}

fn lenient_function<'de, D>(deserializer: D) -> Result<FunctionCall, D::Error>
where
    D: Deserializer<'de>,
{
    let value = JsonValue::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

impl ToolCall {
    /// Create a tool call with object arguments
    pub fn new(name: impl Into<String>, arguments: JsonValue) -> Self {
        Self {
            function: FunctionCall {
                name: Some(name.into()),
                arguments,
            },
        }
    }

    /// Tool name, if the model supplied one
    pub fn name(&self) -> Option<&str> {
        self.function.name.as_deref()
    }

    /// Raw arguments as sent by the model
    pub fn arguments(&self) -> &JsonValue {
        &self.function.arguments
    }
}

/// A message in a transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the sender
    pub role: Role,
    /// Text content; empty when the turn only carries tool calls
    #[serde(default, deserialize_with = "null_as_empty")]
    pub content: String,
    /// Tool name, only for `Role::Tool`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Requested tool calls, only for `Role::Assistant`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl Message {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
            tool_calls: None,
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    /// Create an assistant message that requests tool calls
    pub fn assistant_with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: Some(tool_calls),
            ..Self::plain(Role::Assistant, content)
        }
    }

    /// Create a tool result message
    pub fn tool(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::plain(Role::Tool, content)
        }
    }

    /// Tool calls carried by this message, empty if none
    pub fn tool_calls(&self) -> &[ToolCall] {
        self.tool_calls.as_deref().unwrap_or_default()
    }

    /// Whether this message asks for at least one tool invocation
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls().is_empty()
    }
}

/// Ordered, append-only message history of one request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    /// Create an empty transcript
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// All messages in temporal order
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Most recent message
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Consume the transcript, returning its messages
    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}

impl From<Vec<Message>> for Transcript {
    fn from(messages: Vec<Message>) -> Self {
        Self { messages }
    }
}

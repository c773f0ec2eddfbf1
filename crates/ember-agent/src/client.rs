//! Ollama API client
//!
//! This module provides the [`ChatBackend`] seam the conversation loop talks
//! to, and [`OllamaClient`], its implementation over Ollama's `/api/chat`
//! endpoint, including newline-delimited JSON streaming.

use crate::conversation::Message;
use crate::tools::FunctionTool;
use async_trait::async_trait;
use bytes::BytesMut;
use ember_core::config::BackendConfig;
use futures::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during backend operations
#[derive(Error, Debug)]
pub enum ClientError {
    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Non-success status or in-band error reported by the backend
    #[error("API error: {0}")]
    ApiError(String),

    /// The response did not carry a usable message
    #[error("invalid response from model: {0}")]
    InvalidResponse(String),
}

/// Request sent to the chat endpoint
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    /// Model to use (e.g., "llama3.2:3b")
    pub model: String,
    /// Full transcript
    pub messages: Vec<Message>,
    /// Tool declarations, omitted when streaming
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<FunctionTool>>,
    /// Whether the backend should stream fragments
    pub stream: bool,
}

impl ChatRequest {
    /// Create a non-streaming request without tools
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            tools: None,
            stream: false,
        }
    }

    /// Advertise tools to the model
    pub fn with_tools(mut self, tools: Vec<FunctionTool>) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Request incremental delivery
    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }
}

/// Complete response from the chat endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct ChatResponse {
    /// The assistant message
    pub message: Message,
    /// Model that answered, when reported
    pub model: Option<String>,
    /// Why generation stopped, when reported
    pub done_reason: Option<String>,
}

impl ChatResponse {
    pub fn new(message: Message) -> Self {
        Self {
            message,
            model: None,
            done_reason: None,
        }
    }
}

/// One fragment of a streamed response
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChatChunk {
    /// Partial assistant message
    #[serde(default)]
    pub message: Option<Message>,
    /// Whether this is the final fragment
    #[serde(default)]
    pub done: bool,
    /// Why generation stopped, on the final fragment
    #[serde(default)]
    pub done_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawChatResponse {
    #[serde(default)]
    message: Option<JsonValue>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawChatChunk {
    #[serde(flatten)]
    chunk: ChatChunk,
    #[serde(default)]
    error: Option<String>,
}

/// Stream of fragments produced by [`ChatBackend::chat_stream`]
pub type ChunkStream = BoxStream<'static, Result<ChatChunk, ClientError>>;

/// A chat-completion service the conversation loop can call
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send a transcript and wait for the complete reply
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ClientError>;

    /// Send a transcript and receive the reply incrementally
    async fn chat_stream(&self, request: ChatRequest) -> Result<ChunkStream, ClientError>;
}

/// Ollama API client
#[derive(Debug, Clone)]
pub struct OllamaClient {
    /// HTTP client
    client: reqwest::Client,
    /// API base URL
    base_url: String,
}

impl OllamaClient {
    /// Create a client for a base URL with no request timeout
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Create a client from backend configuration
    pub fn from_config(config: &BackendConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    /// The configured base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn post_chat(&self, request: &ChatRequest) -> Result<reqwest::Response, ClientError> {
        let response = self
            .client
            .post(self.endpoint("chat"))
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            return Err(ClientError::ApiError(format!("{}: {}", status, error_text)));
        }

        Ok(response)
    }
}

#[async_trait]
impl ChatBackend for OllamaClient {
    async fn chat(&self, mut request: ChatRequest) -> Result<ChatResponse, ClientError> {
        request.stream = false;
        tracing::debug!(
            "POST {} model={} messages={}",
            self.endpoint("chat"),
            request.model,
            request.messages.len()
        );

        let body = self.post_chat(&request).await?.bytes().await?;
        let raw: RawChatResponse = serde_json::from_slice(&body)?;
        parse_chat_response(raw)
    }

    async fn chat_stream(&self, mut request: ChatRequest) -> Result<ChunkStream, ClientError> {
        request.stream = true;
        let mut bytes = self.post_chat(&request).await?.bytes_stream().boxed();

        let stream = async_stream::stream! {
            let mut buffer = BytesMut::new();

            while let Some(chunk) = bytes.next().await {
                match chunk {
                    Ok(chunk) => buffer.extend_from_slice(&chunk),
                    Err(e) => {
                        yield Err(ClientError::Http(e));
                        return;
                    }
                }

                while let Some(newline) = buffer.iter().position(|b| *b == b'\n') {
                    let line = buffer.split_to(newline + 1);
                    if let Some(item) = parse_chunk_line(&line) {
                        yield item;
                    }
                }
            }

            // last line may lack a trailing newline
            if let Some(item) = parse_chunk_line(&buffer) {
                yield item;
            }
        };

        Ok(stream.boxed())
    }
}

fn parse_chat_response(raw: RawChatResponse) -> Result<ChatResponse, ClientError> {
    if let Some(error) = raw.error {
        return Err(ClientError::ApiError(error));
    }

    let message = match raw.message {
        Some(value @ JsonValue::Object(_)) => serde_json::from_value::<Message>(value)
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))?,
        Some(_) => return Err(ClientError::InvalidResponse("message is not an object".to_string())),
        None => return Err(ClientError::InvalidResponse("missing message".to_string())),
    };

    Ok(ChatResponse {
        message,
        model: raw.model,
        done_reason: raw.done_reason,
    })
}

/// Decode one NDJSON line; blank and unparseable lines yield nothing
fn parse_chunk_line(line: &[u8]) -> Option<Result<ChatChunk, ClientError>> {
    let line = line.trim_ascii();
    if line.is_empty() {
        return None;
    }

    match serde_json::from_slice::<RawChatChunk>(line) {
        Ok(RawChatChunk { error: Some(error), .. }) => Some(Err(ClientError::ApiError(error))),
        Ok(RawChatChunk { chunk, .. }) => Some(Ok(chunk)),
        Err(e) => {
            tracing::warn!("Failed to parse stream line: {}", e);
            None
        }
    }
}

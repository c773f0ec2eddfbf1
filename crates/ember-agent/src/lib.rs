//! Ember Agent - tool-calling conversation core for ember
//!
//! This crate provides:
//! - An Ollama chat client behind the `ChatBackend` trait, with NDJSON streaming
//! - The tool registry (read_file, write_file, list_files, run_shell_command, search_in_files)
//! - The tool-augmented conversation loop
//! - A streaming adapter that turns backend fragments into events

pub mod agent;
pub mod client;
pub mod conversation;
pub mod streaming;
pub mod tools;

pub use agent::{AgentError, ConversationLoop};
pub use client::{ChatBackend, ChatChunk, ChatRequest, ChatResponse, ChunkStream, ClientError, OllamaClient};
pub use conversation::{FunctionCall, Message, Role, ToolCall, Transcript};
pub use streaming::{stream_events, StreamEvent};
pub use tools::{ToolDeclaration, ToolError, ToolExecutor, ToolRegistry, ToolResult};

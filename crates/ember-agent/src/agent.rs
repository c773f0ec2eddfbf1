//! Tool-augmented conversation loop
//!
//! The loop calls the model with the full transcript and the registry's tool
//! declarations. A reply without tool calls ends the loop; otherwise the
//! assistant turn is appended, each tool call is dispatched in order, its
//! result appended, and the model is called again.

use crate::client::{ChatBackend, ChatRequest, ClientError};
use crate::conversation::{Message, Transcript};
use crate::tools::ToolRegistry;
use std::sync::Arc;
use thiserror::Error;

/// Errors that abort a conversation
#[derive(Error, Debug)]
pub enum AgentError {
    /// The model backend could not be reached or answered nonsense
    #[error("{0}")]
    Backend(#[from] ClientError),

    /// The model kept requesting tools past the round limit
    #[error("tool-call budget exceeded after {0} rounds")]
    RoundLimitExceeded(u32),
}

pub type Result<T> = std::result::Result<T, AgentError>;

/// Drives one request's transcript to a final assistant message
#[derive(Clone)]
pub struct ConversationLoop {
    backend: Arc<dyn ChatBackend>,
    registry: Arc<ToolRegistry>,
    /// Maximum model calls per run, `None` for unbounded
    max_rounds: Option<u32>,
}

impl ConversationLoop {
    /// Create an unbounded loop
    pub fn new(backend: Arc<dyn ChatBackend>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            backend,
            registry,
            max_rounds: None,
        }
    }

    /// Cap the number of model calls per run
    pub fn with_max_rounds(mut self, max_rounds: Option<u32>) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn backend(&self) -> &Arc<dyn ChatBackend> {
        &self.backend
    }

    /// Run the loop until the model answers without tool calls.
    ///
    /// Assistant and tool messages are appended to `transcript` as they
    /// happen. Backend failures are returned immediately and never retried.
    pub async fn run(&self, model: &str, transcript: &mut Transcript) -> Result<Message> {
        let mut round: u32 = 0;

        loop {
            round += 1;
            tracing::debug!(
                "Conversation round {} (limit: {:?}, messages: {})",
                round,
                self.max_rounds,
                transcript.len()
            );

            let request = ChatRequest::new(model, transcript.messages().to_vec())
                .with_tools(self.registry.function_tools().to_vec());

            let response = self.backend.chat(request).await.map_err(|e| {
                tracing::error!("Model backend failed in round {}: {}", round, e);
                AgentError::Backend(e)
            })?;
            let message = response.message;

            if !message.has_tool_calls() {
                transcript.push(message.clone());
                return Ok(message);
            }

            if let Some(limit) = self.max_rounds {
                if round >= limit {
                    tracing::warn!("Model still requesting tools after {} rounds, giving up", round);
                    return Err(AgentError::RoundLimitExceeded(limit));
                }
            }

            let calls = message.tool_calls().to_vec();
            transcript.push(message);

            for call in &calls {
                let result = self.registry.dispatch(call).await;
                transcript.push(result.into_message());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ChatResponse, ChunkStream};
    use crate::conversation::{Role, ToolCall};
    use crate::tools::ToolExecutor;
    use async_trait::async_trait;
    use ember_core::Sandbox;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Replays canned replies and records every request
    #[derive(Default)]
    struct ScriptedBackend {
        replies: Mutex<VecDeque<std::result::Result<Message, ClientError>>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedBackend {
        fn new(replies: Vec<std::result::Result<Message, ClientError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::default(),
            })
        }

        fn requests(&self) -> Vec<ChatRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatBackend for ScriptedBackend {
        async fn chat(&self, request: ChatRequest) -> std::result::Result<ChatResponse, ClientError> {
            self.requests.lock().unwrap().push(request);
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Message::assistant("out of script")));
            reply.map(ChatResponse::new)
        }

        async fn chat_stream(&self, _request: ChatRequest) -> std::result::Result<ChunkStream, ClientError> {
            Err(ClientError::ApiError("not scripted".to_string()))
        }
    }

    fn conversation_loop(backend: Arc<ScriptedBackend>) -> (TempDir, ConversationLoop) {
        let temp_dir = TempDir::new().unwrap();
        let executor = ToolExecutor::new(Sandbox::new(temp_dir.path()).unwrap());
        let registry = Arc::new(ToolRegistry::with_builtin_tools(executor));
        (temp_dir, ConversationLoop::new(backend, registry))
    }

    #[tokio::test]
    async fn test_no_tool_calls_single_round() {
        let backend = ScriptedBackend::new(vec![Ok(Message::assistant("Hello!"))]);
        let (_temp_dir, agent) = conversation_loop(backend.clone());

        let mut transcript = Transcript::from(vec![Message::user("Hi")]);
        let reply = agent.run("m", &mut transcript).await.unwrap();

        assert_eq!(reply, Message::assistant("Hello!"));
        assert_eq!(backend.requests().len(), 1);
        assert_eq!(transcript.len(), 2);
    }

    #[tokio::test]
    async fn test_tools_are_advertised() {
        let backend = ScriptedBackend::new(vec![Ok(Message::assistant("ok"))]);
        let (_temp_dir, agent) = conversation_loop(backend.clone());

        agent.run("llama3.2:3b", &mut Transcript::from(vec![Message::user("Hi")])).await.unwrap();

        let request = &backend.requests()[0];
        assert_eq!(request.model, "llama3.2:3b");
        assert!(!request.stream);
        assert_eq!(request.tools.as_ref().map(Vec::len), Some(5));
    }

    #[tokio::test]
    async fn test_tool_results_appended_in_call_order() {
        let calls = vec![
            ToolCall::new("write_file", json!({"path": "a.txt", "content": "alpha"})),
            ToolCall::new("read_file", json!({"path": "a.txt"})),
            ToolCall::new("no_such_tool", json!({})),
        ];
        let backend = ScriptedBackend::new(vec![
            Ok(Message::assistant_with_tool_calls("", calls.clone())),
            Ok(Message::assistant("Done")),
        ]);
        let (_temp_dir, agent) = conversation_loop(backend.clone());

        let mut transcript = Transcript::from(vec![Message::user("write then read")]);
        let reply = agent.run("m", &mut transcript).await.unwrap();
        assert_eq!(reply.content, "Done");

        let requests = backend.requests();
        assert_eq!(requests.len(), 2);

        // second call sees: user, assistant(tool_calls), three tool results
        let seen = &requests[1].messages;
        assert_eq!(seen.len(), 5);
        assert_eq!(seen[1].tool_calls(), calls.as_slice());

        let tool_messages: Vec<(&str, &str)> = seen[2..]
            .iter()
            .map(|m| {
                assert_eq!(m.role, Role::Tool);
                (m.name.as_deref().unwrap(), m.content.as_str())
            })
            .collect();
        assert_eq!(
            tool_messages,
            vec![
                ("write_file", "✅ File written: a.txt"),
                ("read_file", "alpha"),
                ("no_such_tool", "❌ Error: unknown tool 'no_such_tool'"),
            ]
        );

        assert_eq!(transcript.len(), 6);
        assert_eq!(transcript.last().unwrap().content, "Done");
    }

    #[tokio::test]
    async fn test_tool_errors_do_not_abort() {
        let backend = ScriptedBackend::new(vec![
            Ok(Message::assistant_with_tool_calls(
                "",
                vec![ToolCall::new("read_file", json!({"path": "../../etc/passwd"}))],
            )),
            Ok(Message::assistant("I may not read that.")),
        ]);
        let (_temp_dir, agent) = conversation_loop(backend.clone());

        let mut transcript = Transcript::from(vec![Message::user("read passwd")]);
        let reply = agent.run("m", &mut transcript).await.unwrap();

        assert_eq!(reply.content, "I may not read that.");
        assert_eq!(
            transcript.messages()[2].content,
            "❌ Error: access outside project directory is forbidden"
        );
    }

    #[tokio::test]
    async fn test_malformed_tool_calls_become_unknown_tool_results() {
        let malformed: Message = serde_json::from_value(json!({
            "role": "assistant",
            "content": "",
            "tool_calls": [
                {"id": "c1", "type": "function", "name": "read_file"},
                {"function": {"name": 42, "arguments": {"path": "a.txt"}}}
            ]
        }))
        .unwrap();
        let backend = ScriptedBackend::new(vec![Ok(malformed), Ok(Message::assistant("Recovered"))]);
        let (_temp_dir, agent) = conversation_loop(backend.clone());

        let mut transcript = Transcript::from(vec![Message::user("read a.txt")]);
        let reply = agent.run("m", &mut transcript).await.unwrap();

        assert_eq!(reply.content, "Recovered");
        assert_eq!(backend.requests().len(), 2);
        for message in &transcript.messages()[2..4] {
            assert_eq!(message.role, Role::Tool);
            assert_eq!(message.name.as_deref(), Some("unknown"));
            assert_eq!(message.content, "❌ Error: unknown tool 'unknown'");
        }
    }

    #[tokio::test]
    async fn test_backend_failure_is_fatal() {
        let backend = ScriptedBackend::new(vec![
            Ok(Message::assistant_with_tool_calls("", vec![ToolCall::new("list_files", json!({}))])),
            Err(ClientError::ApiError("connection refused".to_string())),
        ]);
        let (_temp_dir, agent) = conversation_loop(backend.clone());

        let err = agent
            .run("m", &mut Transcript::from(vec![Message::user("Hi")]))
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::Backend(_)));
        assert_eq!(err.to_string(), "API error: connection refused");
        assert_eq!(backend.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_round_limit_fails_closed() {
        let looping = || {
            Ok(Message::assistant_with_tool_calls(
                "",
                vec![ToolCall::new("write_file", json!({"path": "log.txt", "content": "again"}))],
            ))
        };
        let backend = ScriptedBackend::new(vec![looping(), looping(), looping()]);
        let (temp_dir, agent) = conversation_loop(backend.clone());
        let agent = agent.with_max_rounds(Some(2));

        let err = agent
            .run("m", &mut Transcript::from(vec![Message::user("loop")]))
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::RoundLimitExceeded(2)));
        assert_eq!(err.to_string(), "tool-call budget exceeded after 2 rounds");
        assert_eq!(backend.requests().len(), 2);
        assert!(temp_dir.path().join("log.txt").exists());
    }

    #[tokio::test]
    async fn test_same_transcript_same_reply() {
        let backend = ScriptedBackend::new(vec![Ok(Message::assistant("same")), Ok(Message::assistant("same"))]);
        let (_temp_dir, agent) = conversation_loop(backend);
        let transcript = Transcript::from(vec![Message::user("Hi")]);

        let first = agent.run("m", &mut transcript.clone()).await.unwrap();
        let second = agent.run("m", &mut transcript.clone()).await.unwrap();
        assert_eq!(first, second);
    }
}

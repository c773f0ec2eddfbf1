//! Shared application state

use anyhow::Context;
use ember_agent::{ConversationLoop, OllamaClient, ToolExecutor, ToolRegistry};
use ember_core::{CommandFilter, Config, Sandbox};
use std::sync::Arc;

/// State handed to every request handler.
///
/// Everything here is read-only once built; each request owns its own
/// transcript.
#[derive(Clone)]
pub struct AppState {
    /// Conversation loop with its backend and tool registry
    pub conversation: ConversationLoop,
    /// Tools served by `/tools/call` and listed in the manifest
    pub direct_tools: Arc<ToolRegistry>,
    /// Model used when a request does not name one
    pub default_model: String,
}

impl AppState {
    /// Create state whose direct-call surface offers the model-facing tools
    pub fn new(conversation: ConversationLoop, default_model: impl Into<String>) -> Self {
        Self {
            direct_tools: conversation.registry().clone(),
            conversation,
            default_model: default_model.into(),
        }
    }

    /// Replace the registry behind `/tools/call` and the manifest
    pub fn with_direct_tools(mut self, registry: Arc<ToolRegistry>) -> Self {
        self.direct_tools = registry;
        self
    }

    /// Build the backend client, sandbox and tool registry from configuration
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let root = config.sandbox.resolved_project_root()?;
        let sandbox = Sandbox::new(&root)
            .with_context(|| format!("cannot use {} as project root", root.display()))?;

        let executor = ToolExecutor::new(sandbox)
            .with_command_filter(CommandFilter::default())
            .with_shell_timeout(config.sandbox.shell_timeout());
        let direct_tools = Arc::new(ToolRegistry::with_direct_tools(executor.clone()));
        let registry = Arc::new(ToolRegistry::with_builtin_tools(executor));

        let backend = Arc::new(OllamaClient::from_config(&config.backend).context("failed to build HTTP client")?);

        tracing::info!(
            "Project root {}, backend {}, {} model tools, {} direct tools",
            root.display(),
            config.backend.base_url,
            registry.len(),
            direct_tools.len()
        );

        let conversation = ConversationLoop::new(backend, registry).with_max_rounds(config.agent.round_limit());
        Ok(Self::new(conversation, config.backend.default_model.clone()).with_direct_tools(direct_tools))
    }
}

//! Tool registry and dispatcher
//!
//! The registry pairs each declaration with the handler that implements it.
//! It is built once at startup, then shared read-only (behind an `Arc`) by
//! every request.

use super::{all_tools, data_tools, DataTool, FunctionTool, ToolDeclaration, ToolError, ToolExecutor, ToolResult};
use crate::conversation::ToolCall;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// Length of the result preview written to the log
const LOG_PREVIEW_CHARS: usize = 100;

/// Implementation of one tool
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Run the tool with already-validated object arguments
    async fn call(&self, executor: &ToolExecutor, arguments: JsonValue) -> Result<String, ToolError>;
}

/// The built-in tools backed by [`ToolExecutor`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinTool {
    ReadFile,
    WriteFile,
    ListFiles,
    RunShellCommand,
    SearchInFiles,
}

impl BuiltinTool {
    /// Look up a built-in tool by its declared name
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "read_file" => Some(BuiltinTool::ReadFile),
            "write_file" => Some(BuiltinTool::WriteFile),
            "list_files" => Some(BuiltinTool::ListFiles),
            "run_shell_command" => Some(BuiltinTool::RunShellCommand),
            "search_in_files" => Some(BuiltinTool::SearchInFiles),
            _ => None,
        }
    }
}

#[async_trait]
impl ToolHandler for BuiltinTool {
    async fn call(&self, executor: &ToolExecutor, arguments: JsonValue) -> Result<String, ToolError> {
        match self {
            BuiltinTool::ReadFile => executor.read_file(arguments).await,
            BuiltinTool::WriteFile => executor.write_file(arguments).await,
            BuiltinTool::ListFiles => executor.list_files(arguments).await,
            BuiltinTool::RunShellCommand => executor.run_shell_command(arguments).await,
            BuiltinTool::SearchInFiles => executor.search_in_files(arguments).await,
        }
    }
}

struct RegisteredTool {
    declaration: ToolDeclaration,
    handler: Arc<dyn ToolHandler>,
}

/// Name-to-implementation mapping plus the declarations sent to the model
pub struct ToolRegistry {
    executor: ToolExecutor,
    tools: Vec<RegisteredTool>,
    function_tools: Vec<FunctionTool>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("executor", &self.executor)
            .field("tools", &self.tools.iter().map(|t| &t.declaration.name).collect::<Vec<_>>())
            .finish()
    }
}

impl ToolRegistry {
    /// Create a registry with no tools
    pub fn new(executor: ToolExecutor) -> Self {
        Self {
            executor,
            tools: Vec::new(),
            function_tools: Vec::new(),
        }
    }

    /// Create a registry holding the five built-in tools
    pub fn with_builtin_tools(executor: ToolExecutor) -> Self {
        let mut registry = Self::new(executor);
        for declaration in all_tools() {
            if let Some(tool) = BuiltinTool::from_name(&declaration.name) {
                registry.register(declaration, Arc::new(tool));
            }
        }
        registry
    }

    /// Create a registry for the direct-call surface: the built-in tools
    /// followed by the data tools
    pub fn with_direct_tools(executor: ToolExecutor) -> Self {
        let mut registry = Self::with_builtin_tools(executor);
        for declaration in data_tools() {
            if let Some(tool) = DataTool::from_name(&declaration.name) {
                registry.register(declaration, Arc::new(tool));
            }
        }
        registry
    }

    /// Add a tool, replacing any tool already registered under the same name
    pub fn register(&mut self, declaration: ToolDeclaration, handler: Arc<dyn ToolHandler>) {
        match self.position(&declaration.name) {
            Some(index) => {
                self.function_tools[index] = declaration.to_function_tool();
                self.tools[index] = RegisteredTool { declaration, handler };
            }
            None => {
                self.function_tools.push(declaration.to_function_tool());
                self.tools.push(RegisteredTool { declaration, handler });
            }
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.tools.iter().position(|t| t.declaration.name == name)
    }

    /// Declarations in registration order
    pub fn declarations(&self) -> impl Iterator<Item = &ToolDeclaration> {
        self.tools.iter().map(|t| &t.declaration)
    }

    /// Declarations in the function-calling envelope, ready for the backend
    pub fn function_tools(&self) -> &[FunctionTool] {
        &self.function_tools
    }

    /// Whether a tool is registered under `name`
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// The executor handlers run against
    pub fn executor(&self) -> &ToolExecutor {
        &self.executor
    }

    /// Validate and run one tool by name
    pub async fn invoke(&self, name: &str, arguments: JsonValue) -> Result<String, ToolError> {
        let index = self
            .position(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        let arguments = normalize_arguments(arguments)?;

        self.tools[index].handler.call(&self.executor, arguments).await
    }

    /// Run a model-issued tool call, always producing exactly one result
    pub async fn dispatch(&self, call: &ToolCall) -> ToolResult {
        let name = call.name().unwrap_or("unknown");

        let outcome = match call.name() {
            Some(name) => self.invoke(name, call.arguments().clone()).await,
            None => Err(ToolError::UnknownTool(name.to_string())),
        };

        let result = match outcome {
            Ok(content) => ToolResult::success(name, content),
            Err(e) => ToolResult::error(name, &e),
        };

        let preview: String = result.content.chars().take(LOG_PREVIEW_CHARS).collect();
        tracing::info!("Tool {} (error: {}) -> {}", name, result.is_error, preview);

        result
    }
}

/// Decode text arguments and require a JSON object; a missing value counts as `{}`
fn normalize_arguments(arguments: JsonValue) -> Result<JsonValue, ToolError> {
    let arguments = match arguments {
        JsonValue::Null => JsonValue::Object(Default::default()),
        JsonValue::String(text) => serde_json::from_str(&text).map_err(ToolError::InvalidArguments)?,
        other => other,
    };

    if arguments.is_object() {
        Ok(arguments)
    } else {
        Err(ToolError::ArgumentsNotObject)
    }
}

//! Tool definitions advertised to the model
//!
//! This module defines the five built-in tools, their JSON-schema
//! declarations, and the result type that carries a tool's outcome back
//! into the transcript.

mod data;
mod executor;
mod registry;

pub use data::{data_tools, DataTool};
pub use executor::{parse_arguments, ToolError, ToolExecutor};
pub use registry::{BuiltinTool, ToolHandler, ToolRegistry};

use crate::conversation::Message;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Prefix that marks a tool result as a failure in the transcript
pub const ERROR_MARKER: &str = "❌ Error: ";

/// A tool the model may invoke
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    /// Name of the tool, unique within a registry
    pub name: String,
    /// Description of what the tool does
    pub description: String,
    /// JSON schema for the tool's parameters
    pub parameters: JsonValue,
}

impl ToolDeclaration {
    /// Wrap the declaration in the function-calling envelope sent to the backend
    pub fn to_function_tool(&self) -> FunctionTool {
        FunctionTool {
            kind: "function".to_string(),
            function: self.clone(),
        }
    }
}

/// `{type: "function", function: {...}}` envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionTool {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: ToolDeclaration,
}

/// Outcome of one tool invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Name of the tool that produced this result
    pub name: String,
    /// Output text, or the marked error message
    pub content: String,
    /// Whether the tool failed
    pub is_error: bool,
}

impl ToolResult {
    /// Create a successful tool result
    pub fn success(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            is_error: false,
        }
    }

    /// Create an error tool result, rendering the failure marker
    pub fn error(name: impl Into<String>, error: &ToolError) -> Self {
        Self {
            name: name.into(),
            content: format!("{}{}", ERROR_MARKER, error),
            is_error: true,
        }
    }

    /// Convert into a `tool` transcript message
    pub fn into_message(self) -> Message {
        Message::tool(self.name, self.content)
    }
}

/// Create the read_file tool definition
pub fn read_file_tool() -> ToolDeclaration {
    ToolDeclaration {
        name: "read_file".to_string(),
        description: "Read a UTF-8 text file from the project directory.".to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path of the file, relative to the project root"
                }
            },
            "required": ["path"]
        }),
    }
}

/// Create the write_file tool definition
pub fn write_file_tool() -> ToolDeclaration {
    ToolDeclaration {
        name: "write_file".to_string(),
        description: "Write text to a file in the project directory, creating it and any missing parent directories, or overwriting it if it exists.".to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path of the file, relative to the project root"
                },
                "content": {
                    "type": "string",
                    "description": "Full content to write"
                }
            },
            "required": ["path", "content"]
        }),
    }
}

/// Create the list_files tool definition
pub fn list_files_tool() -> ToolDeclaration {
    ToolDeclaration {
        name: "list_files".to_string(),
        description: "List the entries of a directory in the project, sorted by name, as a JSON array.".to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "directory": {
                    "type": "string",
                    "description": "Directory relative to the project root",
                    "default": "."
                }
            },
            "required": []
        }),
    }
}

/// Create the run_shell_command tool definition
pub fn run_shell_command_tool() -> ToolDeclaration {
    ToolDeclaration {
        name: "run_shell_command".to_string(),
        description: "Run a shell command in the project root and return its stdout and stderr. Destructive commands are refused.".to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The command line to execute"
                }
            },
            "required": ["command"]
        }),
    }
}

/// Create the search_in_files tool definition
pub fn search_in_files_tool() -> ToolDeclaration {
    ToolDeclaration {
        name: "search_in_files".to_string(),
        description: "Search project files line by line for a regular expression. Returns a JSON array of {file, line, match}.".to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Regular expression to search for"
                },
                "directory": {
                    "type": "string",
                    "description": "Directory to search, relative to the project root",
                    "default": "."
                }
            },
            "required": ["pattern"]
        }),
    }
}

/// Get all built-in tool declarations
pub fn all_tools() -> Vec<ToolDeclaration> {
    vec![
        read_file_tool(),
        write_file_tool(),
        list_files_tool(),
        run_shell_command_tool(),
        search_in_files_tool(),
    ]
}

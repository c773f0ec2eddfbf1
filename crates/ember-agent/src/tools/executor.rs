//! Tool execution engine
//!
//! This module implements the built-in tools on top of the project sandbox
//! and the command filter. Every tool returns `Result<String, ToolError>`;
//! turning an error into transcript text happens in the registry.

use ember_core::{CommandError, CommandFilter, CommandPlan, Sandbox, SandboxError, SearchMatch};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// Errors that can occur during tool execution
#[derive(Error, Debug)]
pub enum ToolError {
    /// No tool registered under this name
    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    /// Arguments were text that is not valid JSON
    #[error("invalid tool arguments")]
    InvalidArguments(#[source] serde_json::Error),

    /// Arguments decoded to something other than an object
    #[error("arguments must be a JSON object")]
    ArgumentsNotObject,

    /// Unexpected, missing or mistyped parameters
    #[error("invalid arguments ({0})")]
    ParameterMismatch(String),

    /// Sandbox violation or file I/O failure
    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    /// Shell command rejected by the filter
    #[error(transparent)]
    Command(#[from] CommandError),

    /// Search pattern failed to compile
    #[error("invalid regex pattern: {0}")]
    InvalidRegex(#[from] regex::Error),

    /// The process could not be started
    #[error("failed to run command: {0}")]
    Launch(#[source] std::io::Error),

    /// The process outlived the shell timeout and was killed
    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    /// Result encoding failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A CSV file could not be parsed
    #[error("invalid CSV: {0}")]
    Csv(#[from] csv::Error),

    /// The requested column is not a CSV header
    #[error("column '{0}' not found in CSV")]
    UnknownColumn(String),
}

impl ToolError {
    /// Whether the failure is about the shape of the call rather than its execution
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            ToolError::InvalidArguments(_) | ToolError::ArgumentsNotObject | ToolError::ParameterMismatch(_)
        )
    }
}

/// Deserialize tool arguments, reporting shape problems as a parameter mismatch
pub fn parse_arguments<T: DeserializeOwned>(arguments: JsonValue) -> Result<T, ToolError> {
    serde_json::from_value(arguments).map_err(|e| ToolError::ParameterMismatch(e.to_string()))
}

fn current_dir() -> String {
    ".".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ReadFileArgs {
    path: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WriteFileArgs {
    path: String,
    content: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ListFilesArgs {
    #[serde(default = "current_dir")]
    directory: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RunShellCommandArgs {
    command: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SearchInFilesArgs {
    pattern: String,
    #[serde(default = "current_dir")]
    directory: String,
}

/// Runs the built-in tools inside one project root
#[derive(Debug, Clone)]
pub struct ToolExecutor {
    sandbox: Sandbox,
    filter: CommandFilter,
    shell_timeout: Option<Duration>,
}

impl ToolExecutor {
    /// Create an executor with the default denylist and no shell timeout
    pub fn new(sandbox: Sandbox) -> Self {
        Self {
            sandbox,
            filter: CommandFilter::default(),
            shell_timeout: None,
        }
    }

    /// Replace the command filter
    pub fn with_command_filter(mut self, filter: CommandFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Kill shell commands that run longer than `timeout`
    pub fn with_shell_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.shell_timeout = timeout;
        self
    }

    pub(crate) fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    /// Execute the read_file tool
    pub async fn read_file(&self, arguments: JsonValue) -> Result<String, ToolError> {
        let args: ReadFileArgs = parse_arguments(arguments)?;
        Ok(self.sandbox.read_file(&args.path).await?)
    }

    /// Execute the write_file tool
    pub async fn write_file(&self, arguments: JsonValue) -> Result<String, ToolError> {
        let args: WriteFileArgs = parse_arguments(arguments)?;
        self.sandbox.write_file(&args.path, &args.content).await?;
        Ok(format!("✅ File written: {}", args.path))
    }

    /// Execute the list_files tool
    pub async fn list_files(&self, arguments: JsonValue) -> Result<String, ToolError> {
        let args: ListFilesArgs = parse_arguments(arguments)?;
        let entries = self.sandbox.list_entries(&args.directory).await?;
        Ok(serde_json::to_string(&entries)?)
    }

    /// Execute the run_shell_command tool
    pub async fn run_shell_command(&self, arguments: JsonValue) -> Result<String, ToolError> {
        let args: RunShellCommandArgs = parse_arguments(arguments)?;
        let plan = self.filter.plan(&args.command)?;

        let mut command = match &plan {
            CommandPlan::Direct(argv) => {
                let Some((program, rest)) = argv.split_first() else {
                    return Err(CommandError::Empty.into());
                };
                let mut command = Command::new(program);
                command.args(rest);
                command
            }
            CommandPlan::Shell(script) => {
                let mut command = Command::new("sh");
                command.arg("-c").arg(script);
                command
            }
        };

        command
            .current_dir(self.sandbox.root())
            .stdin(Stdio::null())
            .kill_on_drop(true);

        tracing::debug!("Running command (shell: {}): {}", plan.uses_shell(), args.command.trim());

        let output = match self.shell_timeout {
            Some(limit) => tokio::time::timeout(limit, command.output())
                .await
                .map_err(|_| ToolError::Timeout(limit))?,
            None => command.output().await,
        }
        .map_err(ToolError::Launch)?;

        Ok(format_command_output(&output.stdout, &output.stderr))
    }

    /// Execute the search_in_files tool
    pub async fn search_in_files(&self, arguments: JsonValue) -> Result<String, ToolError> {
        let args: SearchInFilesArgs = parse_arguments(arguments)?;
        let files = self.sandbox.walk_files(&args.directory).await?;
        let regex = Regex::new(&args.pattern)?;

        let mut matches = Vec::new();
        for path in files {
            let Some(relative) = self.sandbox.relative(&path) else {
                continue;
            };

            let content = match tokio::fs::read_to_string(&path).await {
                Ok(content) => content,
                Err(e) => {
                    tracing::warn!("Skipping unreadable file {}: {}", relative, e);
                    continue;
                }
            };

            for (index, line) in content.lines().enumerate() {
                if let Some(found) = regex.find(line) {
                    matches.push(SearchMatch::new(relative.clone(), index + 1, found.as_str()));
                }
            }
        }

        Ok(serde_json::to_string(&matches)?)
    }
}

/// Trimmed stdout, then a `[stderr]` section, or a placeholder when both are empty
fn format_command_output(stdout: &[u8], stderr: &[u8]) -> String {
    let stdout = String::from_utf8_lossy(stdout);
    let stderr = String::from_utf8_lossy(stderr);

    let mut parts = Vec::new();
    if !stdout.trim().is_empty() {
        parts.push(stdout.trim().to_string());
    }
    if !stderr.trim().is_empty() {
        parts.push(format!("[stderr]\n{}", stderr.trim()));
    }

    if parts.is_empty() {
        "(no output)".to_string()
    } else {
        parts.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn executor() -> (TempDir, ToolExecutor) {
        let temp_dir = TempDir::new().unwrap();
        let executor = ToolExecutor::new(Sandbox::new(temp_dir.path()).unwrap());
        (temp_dir, executor)
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let (_temp_dir, executor) = executor();

        let result = executor
            .write_file(json!({"path": "notes/todo.txt", "content": "line one\nline two"}))
            .await
            .unwrap();
        assert_eq!(result, "✅ File written: notes/todo.txt");

        let content = executor.read_file(json!({"path": "notes/todo.txt"})).await.unwrap();
        assert_eq!(content, "line one\nline two");
    }

    #[tokio::test]
    async fn test_file_tools_reject_escape() {
        let (_temp_dir, executor) = executor();

        let read = executor.read_file(json!({"path": "../secret"})).await.unwrap_err();
        let write = executor
            .write_file(json!({"path": "../../x.txt", "content": "x"}))
            .await
            .unwrap_err();
        let list = executor.list_files(json!({"directory": ".."})).await.unwrap_err();
        let search = executor
            .search_in_files(json!({"pattern": "x", "directory": "../.."}))
            .await
            .unwrap_err();

        for err in [read, write, list, search] {
            assert_eq!(err.to_string(), "access outside project directory is forbidden");
        }
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        let (_temp_dir, executor) = executor();
        let err = executor.read_file(json!({"path": "nope.txt"})).await.unwrap_err();
        assert!(matches!(err, ToolError::Sandbox(SandboxError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_files_sorted() {
        let (temp_dir, executor) = executor();
        std::fs::create_dir(temp_dir.path().join("b")).unwrap();
        std::fs::write(temp_dir.path().join("a.txt"), "a").unwrap();

        let result = executor.list_files(json!({})).await.unwrap();
        assert_eq!(result, r#"["a.txt","b"]"#);
    }

    #[tokio::test]
    async fn test_list_files_errors() {
        let (temp_dir, executor) = executor();
        std::fs::write(temp_dir.path().join("file.txt"), "x").unwrap();

        let missing = executor.list_files(json!({"directory": "ghost"})).await.unwrap_err();
        assert_eq!(missing.to_string(), "directory does not exist");

        let not_dir = executor.list_files(json!({"directory": "file.txt"})).await.unwrap_err();
        assert_eq!(not_dir.to_string(), "path is not a directory");
    }

    #[tokio::test]
    async fn test_parameter_mismatch() {
        let (_temp_dir, executor) = executor();

        let missing = executor.read_file(json!({})).await.unwrap_err();
        assert!(matches!(missing, ToolError::ParameterMismatch(_)));
        assert!(missing.to_string().contains("missing field `path`"));

        let unexpected = executor
            .read_file(json!({"path": "a.txt", "encoding": "utf-8"}))
            .await
            .unwrap_err();
        assert!(unexpected.to_string().starts_with("invalid arguments ("));
        assert!(unexpected.is_invalid_input());
    }

    #[tokio::test]
    async fn test_shell_echo() {
        let (_temp_dir, executor) = executor();
        let result = executor.run_shell_command(json!({"command": "echo test"})).await.unwrap();
        assert_eq!(result, "test");
    }

    #[tokio::test]
    async fn test_shell_runs_in_project_root() {
        let (temp_dir, executor) = executor();
        std::fs::write(temp_dir.path().join("marker.txt"), "").unwrap();

        let result = executor.run_shell_command(json!({"command": "ls"})).await.unwrap();
        assert!(result.contains("marker.txt"));
    }

    #[tokio::test]
    async fn test_shell_captures_stderr_section() {
        let (_temp_dir, executor) = executor();
        let result = executor
            .run_shell_command(json!({"command": "echo out; echo err 1>&2"}))
            .await
            .unwrap();
        assert_eq!(result, "out\n[stderr]\nerr");
    }

    #[tokio::test]
    async fn test_shell_placeholder_when_silent() {
        let (_temp_dir, executor) = executor();
        let result = executor.run_shell_command(json!({"command": "true"})).await.unwrap();
        assert_eq!(result, "(no output)");
    }

    #[tokio::test]
    async fn test_shell_denied_without_running() {
        let (temp_dir, executor) = executor();
        std::fs::write(temp_dir.path().join("keep.txt"), "x").unwrap();

        let err = executor.run_shell_command(json!({"command": "rm -rf /"})).await.unwrap_err();
        assert_eq!(err.to_string(), "command denied by security policy");

        let err = executor
            .run_shell_command(json!({"command": "rm -rf keep.txt"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Command(CommandError::Denied { .. })));
        assert!(temp_dir.path().join("keep.txt").exists());
    }

    #[tokio::test]
    async fn test_shell_empty_command() {
        let (_temp_dir, executor) = executor();
        let err = executor.run_shell_command(json!({"command": "   "})).await.unwrap_err();
        assert_eq!(err.to_string(), "command must not be empty");
    }

    #[tokio::test]
    async fn test_shell_launch_failure_is_an_error() {
        let (_temp_dir, executor) = executor();
        let err = executor
            .run_shell_command(json!({"command": "definitely-not-a-real-binary-xyz"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Launch(_)));
    }

    #[tokio::test]
    async fn test_shell_timeout() {
        let (_temp_dir, executor) = executor();
        let executor = executor.with_shell_timeout(Some(Duration::from_millis(200)));

        let err = executor.run_shell_command(json!({"command": "sleep 5"})).await.unwrap_err();
        assert!(matches!(err, ToolError::Timeout(_)));
        assert_eq!(err.to_string(), "command timed out after 200ms");
    }

    #[tokio::test]
    async fn test_search_single_match() {
        let (temp_dir, executor) = executor();
        std::fs::write(temp_dir.path().join("notes.txt"), "TODO: finish tests\nnothing here").unwrap();

        let result = executor.search_in_files(json!({"pattern": "TODO"})).await.unwrap();
        let matches: JsonValue = serde_json::from_str(&result).unwrap();
        assert_eq!(matches, json!([{"file": "notes.txt", "line": 1, "match": "TODO"}]));
    }

    #[tokio::test]
    async fn test_search_recurses_and_skips_binary() {
        let (temp_dir, executor) = executor();
        std::fs::create_dir_all(temp_dir.path().join("src/nested")).unwrap();
        std::fs::write(temp_dir.path().join("src/a.rs"), "fn a() {}\n// fixme later").unwrap();
        std::fs::write(temp_dir.path().join("src/nested/b.rs"), "fn b() {}").unwrap();
        std::fs::write(temp_dir.path().join("src/blob.bin"), [0xff, 0xfe, 0x00]).unwrap();

        let result = executor
            .search_in_files(json!({"pattern": r"fn \w+", "directory": "src"}))
            .await
            .unwrap();
        let matches: Vec<SearchMatch> = serde_json::from_str(&result).unwrap();

        assert_eq!(
            matches,
            vec![
                SearchMatch::new("src/a.rs", 1, "fn a"),
                SearchMatch::new("src/nested/b.rs", 1, "fn b"),
            ]
        );
    }

    #[tokio::test]
    async fn test_search_bad_regex() {
        let (_temp_dir, executor) = executor();
        let err = executor.search_in_files(json!({"pattern": "(unclosed"})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidRegex(_)));
    }

    #[test]
    fn test_format_command_output() {
        assert_eq!(format_command_output(b"  hi \n", b""), "hi");
        assert_eq!(format_command_output(b"", b"oops\n"), "[stderr]\noops");
        assert_eq!(format_command_output(b"\n", b" \n"), "(no output)");
    }
}

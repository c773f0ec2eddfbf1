//! Shell command policy
//!
//! This module decides whether a raw command string may run at all (a regex
//! denylist matched against the whole string, not tokens) and how an accepted
//! command should be launched: directly from an argument vector when it uses
//! no shell syntax, or through `sh -c` otherwise.

use regex::Regex;
use thiserror::Error;

/// Patterns that are never allowed to reach process execution
pub const DEFAULT_DENYLIST: &[&str] = &[
    // recursive forced delete: rm -rf, rm -fr, rm -Rf, rm -rfv ...
    r"(?i)rm\s+-[a-z]*(r[a-z]*f|f[a-z]*r)",
    r"(?i)rm\s+--recursive\s+--force",
    r"(?i)sudo",
    // fork bomb, spacing optional
    r":\s*\(\s*\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;\s*:",
];

/// Characters that need a shell to interpret
const SHELL_METACHARACTERS: &[char] = &[
    '|', '&', ';', '<', '>', '(', ')', '$', '`', '\\', '*', '?', '[', ']', '{', '}', '~', '!', '\n', '\r',
];

/// Errors that can occur while vetting a command
#[derive(Error, Debug)]
pub enum CommandError {
    /// Empty or whitespace-only command
    #[error("command must not be empty")]
    Empty,

    /// Command matched a denylist pattern
    #[error("command denied by security policy")]
    Denied {
        /// The pattern that matched
        pattern: String,
    },

    /// A denylist pattern failed to compile
    #[error("invalid denylist pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

pub type Result<T> = std::result::Result<T, CommandError>;

/// How an accepted command is launched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandPlan {
    /// Program and arguments, executed without a shell
    Direct(Vec<String>),
    /// Command string handed to `sh -c`
    Shell(String),
}

impl CommandPlan {
    /// Decide how to launch an already-vetted command
    pub fn for_command(command: &str) -> Self {
        if command.contains(SHELL_METACHARACTERS) {
            return CommandPlan::Shell(command.to_string());
        }

        match shlex::split(command) {
            Some(argv) if !argv.is_empty() => CommandPlan::Direct(argv),
            // unbalanced quotes: let the shell report it
            _ => CommandPlan::Shell(command.to_string()),
        }
    }

    /// Whether a shell interpreter is involved
    pub fn uses_shell(&self) -> bool {
        matches!(self, CommandPlan::Shell(_))
    }
}

/// Denylist-based command filter
#[derive(Debug, Clone)]
pub struct CommandFilter {
    /// Compiled denylist
    patterns: Vec<Regex>,
}

impl CommandFilter {
    /// Build a filter from custom patterns
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| Regex::new(p.as_ref()))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self { patterns })
    }

    /// Number of patterns in the denylist
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Whether the denylist is empty
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Vet a command, returning it trimmed when allowed
    pub fn check<'a>(&self, command: &'a str) -> Result<&'a str> {
        let trimmed = command.trim();
        if trimmed.is_empty() {
            return Err(CommandError::Empty);
        }

        if let Some(pattern) = self.patterns.iter().find(|p| p.is_match(trimmed)) {
            tracing::warn!("Command denied by pattern {}: {}", pattern.as_str(), trimmed);
            return Err(CommandError::Denied {
                pattern: pattern.as_str().to_string(),
            });
        }

        Ok(trimmed)
    }

    /// Vet a command and plan its launch
    pub fn plan(&self, command: &str) -> Result<CommandPlan> {
        self.check(command).map(CommandPlan::for_command)
    }
}

impl Default for CommandFilter {
    fn default() -> Self {
        let patterns = DEFAULT_DENYLIST
            .iter()
            .filter_map(|p| match Regex::new(p) {
                Ok(regex) => Some(regex),
                Err(e) => {
                    tracing::error!("Dropping invalid denylist pattern {}: {}", p, e);
                    None
                }
            })
            .collect();

        Self { patterns }
    }
}

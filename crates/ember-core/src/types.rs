//! Shared types used across ember

use serde::{Deserialize, Serialize};

/// One line matched by a text search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchMatch {
    /// File path relative to the project root, `/`-separated
    pub file: String,
    /// 1-based line number
    pub line: usize,
    /// The matched text (first match on the line)
    #[serde(rename = "match")]
    pub matched: String,
}

impl SearchMatch {
    /// Create a new SearchMatch
    pub fn new(file: impl Into<String>, line: usize, matched: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line,
            matched: matched.into(),
        }
    }
}

// ABOUTME: Structured slash-separated path naming one agent instance in a call chain.
// ABOUTME: Replaces ad hoc string splitting with segment-aware parent/child/root-stripping operations.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Name of the synthetic frame at the bottom of every view stack.
pub const ROOT: &str = "root";

/// Errors that can occur when parsing an agent path.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("agent path is empty")]
    Empty,

    #[error("agent path has an empty segment: {0:?}")]
    EmptySegment(String),
}

/// Full path of an agent instance, e.g. `root/Manager/Coder`.
///
/// Always holds at least one segment. The first segment names whatever sits at
/// the bottom of the call chain; the view stack does not know the real name of
/// that agent, so comparisons between a step author and a frame ignore it
/// (see [`AgentPath::same_agent`]).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AgentPath {
    segments: Vec<String>,
}

impl AgentPath {
    /// The path of the synthetic root frame.
    pub fn root() -> Self {
        Self {
            segments: vec![ROOT.to_string()],
        }
    }

    /// Parse a slash-separated path. Every segment must be non-empty.
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        if raw.is_empty() {
            return Err(PathError::Empty);
        }
        let segments: Vec<String> = raw.split('/').map(str::to_string).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(PathError::EmptySegment(raw.to_string()));
        }
        Ok(Self { segments })
    }

    /// Path of a direct subagent of this agent.
    pub fn child(&self, name: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Self { segments }
    }

    /// Path with the last segment removed. A single-segment path is its own parent.
    pub fn parent(&self) -> Self {
        if self.segments.len() == 1 {
            return self.clone();
        }
        Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        }
    }

    /// Short name of the agent: the last segment.
    pub fn name(&self) -> &str {
        // segments is never empty
        self.segments.last().map(String::as_str).unwrap_or(ROOT)
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Segments after the first one.
    pub fn without_root(&self) -> &[String] {
        &self.segments[1..]
    }

    /// Number of segments; the root path has depth 1.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// True when both paths name the same agent once the first segment is ignored.
    pub fn same_agent(&self, other: &AgentPath) -> bool {
        self.without_root() == other.without_root()
    }
}

impl fmt::Display for AgentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

impl FromStr for AgentPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for AgentPath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<AgentPath> for String {
    fn from(path: AgentPath) -> Self {
        path.to_string()
    }
}

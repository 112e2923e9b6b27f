//! Value types shared by the streaming engine, the turn store and presentation sinks.
//!
//! These types carry no protocol or transport details. A [`Turn`] is the unit the
//! engine freezes, persists and replays; a [`ToolCall`] is owned by its parent turn
//! once the engine hands it over.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier for one request/response cycle started by a user submission.
pub type RunId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// Which agent produced a turn.
///
/// Nested agents are attributed by the tool-use id of the call that spawned them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum TurnSource {
    Main,
    Subagent(String),
}

impl TurnSource {
    /// Maps a protocol `parent_tool_use_id` to a source; absent or empty means main.
    #[must_use]
    pub fn from_parent_tool_use_id(parent: Option<&str>) -> Self {
        match parent.map(str::trim).filter(|value| !value.is_empty()) {
            Some(parent) => Self::Subagent(parent.to_owned()),
            None => Self::Main,
        }
    }

    #[must_use]
    pub fn is_main(&self) -> bool {
        matches!(self, Self::Main)
    }
}

impl fmt::Display for TurnSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Main => f.write_str("main"),
            Self::Subagent(parent) => write!(f, "subagent:{parent}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    Starting,
    Running,
    Complete,
    Error,
}

/// Output reported by the upstream service for one tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub content: Option<String>,
    pub is_error: bool,
}

/// Why a tool call carries degraded data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolCallDiagnostic {
    /// The argument stream closed before it formed a complete JSON document.
    IncompleteInput { partial_json: String },
}

/// One tool invocation announced inside an assistant turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_index: Option<usize>,
    pub input: Value,
    pub status: ToolCallStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ToolOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<ToolCallDiagnostic>,
}

impl ToolCall {
    /// A freshly announced call whose arguments have not streamed yet.
    #[must_use]
    pub fn starting(id: impl Into<String>, name: impl Into<String>, block_index: usize) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            block_index: Some(block_index),
            input: empty_input(),
            status: ToolCallStatus::Starting,
            result: None,
            diagnostic: None,
        }
    }

    /// A call delivered whole, outside of block streaming.
    #[must_use]
    pub fn complete(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            block_index: None,
            input,
            status: ToolCallStatus::Complete,
            result: None,
            diagnostic: None,
        }
    }

    /// Records the tool's output and moves the call to its terminal status.
    pub fn apply_output(&mut self, output: ToolOutput) {
        self.status = if output.is_error {
            ToolCallStatus::Error
        } else {
            ToolCallStatus::Complete
        };
        self.result = Some(output);
    }

    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.diagnostic.is_some()
    }
}

/// The structured placeholder used before arguments parse.
#[must_use]
pub fn empty_input() -> Value {
    Value::Object(serde_json::Map::new())
}

/// How a turn stopped accepting mutations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TurnCompletion {
    Streaming,
    Complete,
    Interrupted,
    Partial { reason: String },
}

/// One conversational unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub id: String,
    pub role: Role,
    pub text: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub thinking: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    pub source: TurnSource,
    /// RFC3339 UTC timestamp of when the turn opened.
    pub timestamp: String,
    pub completion: TurnCompletion,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    /// Set only on turns reconstructed from storage; never persisted.
    #[serde(default, skip_serializing)]
    pub from_replay: bool,
}

impl Turn {
    #[must_use]
    pub fn user(id: impl Into<String>, text: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::User,
            text: text.into(),
            thinking: String::new(),
            tool_calls: Vec::new(),
            source: TurnSource::Main,
            timestamp: timestamp.into(),
            completion: TurnCompletion::Complete,
            stop_reason: None,
            from_replay: false,
        }
    }

    #[must_use]
    pub fn assistant(id: impl Into<String>, source: TurnSource, timestamp: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::Assistant,
            text: String::new(),
            thinking: String::new(),
            tool_calls: Vec::new(),
            source,
            timestamp: timestamp.into(),
            completion: TurnCompletion::Streaming,
            stop_reason: None,
            from_replay: false,
        }
    }

    #[must_use]
    pub fn is_frozen(&self) -> bool {
        !matches!(self.completion, TurnCompletion::Streaming)
    }

    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        matches!(self.completion, TurnCompletion::Interrupted)
    }

    #[must_use]
    pub fn tool_call(&self, id: &str) -> Option<&ToolCall> {
        self.tool_calls.iter().find(|call| call.id == id)
    }

    pub fn tool_call_mut(&mut self, id: &str) -> Option<&mut ToolCall> {
        self.tool_calls.iter_mut().find(|call| call.id == id)
    }

    /// Inserts or replaces a tool call, keeping at most one call per id.
    pub fn upsert_tool_call(&mut self, call: ToolCall) {
        match self.tool_call_mut(&call.id) {
            Some(existing) => *existing = call,
            None => self.tool_calls.push(call),
        }
    }
}

/// A tool result recorded after the turn that announced the call froze.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResultRecord {
    pub tool_use_id: String,
    pub content: Option<String>,
    pub is_error: bool,
    pub timestamp: String,
}

impl ToolResultRecord {
    #[must_use]
    pub fn output(&self) -> ToolOutput {
        ToolOutput {
            content: self.content.clone(),
            is_error: self.is_error,
        }
    }
}

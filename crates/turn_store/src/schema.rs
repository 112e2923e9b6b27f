use serde::{Deserialize, Serialize};
use turn_model::{ToolResultRecord, Turn};

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionHeader {
    pub version: u32,
    pub session_id: String,
    pub created_at: String,
}

impl SessionHeader {
    #[must_use]
    pub fn v1(session_id: impl Into<String>, created_at: impl Into<String>) -> Self {
        Self {
            version: SCHEMA_VERSION,
            session_id: session_id.into(),
            created_at: created_at.into(),
        }
    }
}

/// Everything recorded for one session, in write order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionLog {
    pub turns: Vec<Turn>,
    pub tool_results: Vec<ToolResultRecord>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum JsonLine {
    Session(SessionHeader),
    Turn { turn: Turn },
    ToolResult { result: ToolResultRecord },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum JsonLineRef<'a> {
    Session(&'a SessionHeader),
    Turn { turn: &'a Turn },
    ToolResult { result: &'a ToolResultRecord },
}

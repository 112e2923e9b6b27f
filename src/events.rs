use serde_json::Value;
use stream_protocol::{ResultFrame, RetryNotice};
use turn_model::{RunId, ToolCall, ToolOutput, Turn, TurnSource};

/// Everything a presentation sink needs; sinks never see protocol frames.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// An assistant turn received its first visible content.
    TurnOpened {
        turn_id: String,
        source: TurnSource,
    },
    TextDelta {
        turn_id: String,
        source: TurnSource,
        text: String,
    },
    ThinkingDelta {
        turn_id: String,
        source: TurnSource,
        text: String,
    },
    /// Snapshot of a call whose status or arguments changed.
    ToolCallUpdated {
        turn_id: String,
        source: TurnSource,
        call: ToolCall,
    },
    /// A turn stopped accepting mutations. Replayed turns arrive here with `from_replay` set.
    TurnFrozen { turn: Turn },
    /// Output for a call whose turn already froze, or for an id no turn announced.
    ToolResult {
        tool_use_id: String,
        output: ToolOutput,
    },
    SessionStarted { session_id: String },
    SessionReset,
    CostUpdated {
        last_query_usd: f64,
        cumulative_usd: f64,
    },
    /// Advisory upstream retry; display only.
    RetryNotice(RetryNotice),
    /// An `error` frame from the upstream runtime.
    UpstreamError { message: String },
    /// Non-blocking transport condition such as a dropped connection.
    TransportNotice { message: String },
    RunEnded { run_id: RunId, outcome: RunOutcome },
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(RunSummary),
    Interrupted,
    /// The stream ended without a terminal result.
    StreamClosed,
    StreamFailed { message: String },
}

/// Details from the terminal `result` frame of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub subtype: Option<String>,
    pub is_error: bool,
    pub result: Option<String>,
    pub num_turns: Option<u32>,
    pub duration_ms: Option<u64>,
    pub duration_api_ms: Option<u64>,
    pub cost_usd: f64,
    pub usage: Option<Value>,
}

impl RunSummary {
    pub(crate) fn from_frame(frame: ResultFrame, cost_usd: f64) -> Self {
        Self {
            subtype: frame.subtype,
            is_error: frame.is_error,
            result: frame.result,
            num_turns: frame.num_turns,
            duration_ms: frame.duration_ms,
            duration_api_ms: frame.duration_api_ms,
            cost_usd,
            usage: frame.usage,
        }
    }
}

use std::fmt;

use serde_json::Value;

/// One decoded record from the upstream push stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    StreamEvent(StreamEventFrame),
    Assistant(AssistantFrame),
    ToolResult(ToolResultFrame),
    Result(ResultFrame),
    System(SystemFrame),
    /// Echo of a user message; carries nothing the engine needs.
    User { content: Option<String> },
    Error { content: String },
    /// End-of-stream sentinel emitted by the origin proxy.
    Done,
    /// A `type` this client does not know; kept for forward compatibility.
    Unknown { kind: String },
}

/// Lifecycle moment inside one assistant message.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEventFrame {
    pub session_id: Option<String>,
    pub parent_tool_use_id: Option<String>,
    pub event: StreamEvent,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    MessageStart {
        model: Option<String>,
        message_id: Option<String>,
    },
    ContentBlockStart {
        block_index: usize,
        block: BlockStart,
    },
    ContentBlockDelta {
        block_index: usize,
        delta: BlockDelta,
    },
    ContentBlockStop {
        block_index: usize,
    },
    MessageDelta {
        stop_reason: Option<String>,
        usage: Option<Value>,
    },
    MessageStop,
    Unknown {
        event_type: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockStart {
    Text,
    Thinking,
    ToolUse { tool_id: String, tool_name: String },
    Other { block_type: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockDelta {
    Text(String),
    InputJson(String),
    Thinking(String),
    Other { delta_type: String },
}

/// A complete assistant message, sent alongside or instead of stream events.
#[derive(Debug, Clone, PartialEq)]
pub struct AssistantFrame {
    pub content: String,
    pub tool_uses: Vec<AssistantToolUse>,
    pub thinking: Vec<String>,
    pub model: Option<String>,
    pub parent_tool_use_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssistantToolUse {
    pub id: String,
    pub name: String,
    pub input: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolResultFrame {
    pub results: Vec<ToolResultEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResultEntry {
    pub tool_use_id: String,
    pub content: Option<String>,
    pub is_error: bool,
}

/// Terminal summary of one query.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultFrame {
    pub subtype: Option<String>,
    pub result: Option<String>,
    pub is_error: bool,
    pub num_turns: Option<u32>,
    pub duration_ms: Option<u64>,
    pub duration_api_ms: Option<u64>,
    pub total_cost_usd: Option<f64>,
    pub session_id: Option<String>,
    pub usage: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SystemFrame {
    Init {
        session_id: Option<String>,
        model: Option<String>,
    },
    Retry(RetryNotice),
    Other {
        subtype: String,
    },
}

/// Advisory notice that the upstream service is retrying internally.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryNotice {
    pub attempt: Option<u32>,
    pub max_retries: Option<u32>,
    pub delay: Option<f64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    NotAnObject,
    MissingType,
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAnObject => write!(f, "record is not a JSON object"),
            Self::MissingType => write!(f, "record has no string `type` discriminator"),
        }
    }
}

impl std::error::Error for FrameError {}

impl Frame {
    /// Classifies a parsed record by its top-level `type`.
    pub fn decode(value: &Value) -> Result<Self, FrameError> {
        if !value.is_object() {
            return Err(FrameError::NotAnObject);
        }
        let kind = str_field(value, "type").ok_or(FrameError::MissingType)?;

        Ok(match kind.as_str() {
            "stream_event" => Self::StreamEvent(StreamEventFrame {
                session_id: non_empty_field(value, "session_id"),
                parent_tool_use_id: non_empty_field(value, "parent_tool_use_id"),
                event: decode_stream_event(value),
            }),
            "assistant" => Self::Assistant(decode_assistant(value)),
            "tool_result" => Self::ToolResult(decode_tool_result(value)),
            "result" => Self::Result(decode_result(value)),
            "system" => Self::System(decode_system(value)),
            "user" => Self::User {
                content: str_field(value, "content"),
            },
            "error" => Self::Error {
                content: content_text(value.get("content"))
                    .unwrap_or_else(|| "unknown upstream error".to_owned()),
            },
            _ => Self::Unknown { kind },
        })
    }

    /// The session id this frame announces, if any.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::StreamEvent(frame) => frame.session_id.as_deref(),
            Self::Result(frame) => frame.session_id.as_deref(),
            Self::System(SystemFrame::Init { session_id, .. }) => session_id.as_deref(),
            _ => None,
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            Self::StreamEvent(_) => "stream_event",
            Self::Assistant(_) => "assistant",
            Self::ToolResult(_) => "tool_result",
            Self::Result(_) => "result",
            Self::System(_) => "system",
            Self::User { .. } => "user",
            Self::Error { .. } => "error",
            Self::Done => "done",
            Self::Unknown { kind } => kind,
        }
    }
}

fn decode_stream_event(value: &Value) -> StreamEvent {
    let event_type = str_field(value, "event_type").unwrap_or_default();
    let block_index = block_index(value);

    match event_type.as_str() {
        "message_start" => StreamEvent::MessageStart {
            model: non_empty_field(value, "model"),
            message_id: non_empty_field(value, "message_id"),
        },
        "content_block_start" => {
            let block_type = str_field(value, "block_type").unwrap_or_default();
            let block = match block_type.as_str() {
                "text" => BlockStart::Text,
                "thinking" => BlockStart::Thinking,
                "tool_use" => BlockStart::ToolUse {
                    tool_id: str_field(value, "tool_id").unwrap_or_default(),
                    tool_name: str_field(value, "tool_name").unwrap_or_default(),
                },
                _ => BlockStart::Other { block_type },
            };
            StreamEvent::ContentBlockStart { block_index, block }
        }
        "content_block_delta" => {
            let delta_type = str_field(value, "delta_type").unwrap_or_default();
            let delta = match delta_type.as_str() {
                "text_delta" => BlockDelta::Text(str_field(value, "text").unwrap_or_default()),
                "input_json_delta" => {
                    BlockDelta::InputJson(str_field(value, "partial_json").unwrap_or_default())
                }
                "thinking_delta" => {
                    BlockDelta::Thinking(str_field(value, "thinking").unwrap_or_default())
                }
                _ => BlockDelta::Other { delta_type },
            };
            StreamEvent::ContentBlockDelta { block_index, delta }
        }
        "content_block_stop" => StreamEvent::ContentBlockStop { block_index },
        "message_delta" => StreamEvent::MessageDelta {
            stop_reason: non_empty_field(value, "stop_reason"),
            usage: value.get("usage").filter(|usage| !usage.is_null()).cloned(),
        },
        "message_stop" => StreamEvent::MessageStop,
        _ => StreamEvent::Unknown { event_type },
    }
}

fn decode_assistant(value: &Value) -> AssistantFrame {
    let tool_uses = value
        .get("tool_uses")
        .and_then(Value::as_array)
        .map(|uses| {
            uses.iter()
                .filter_map(|tool_use| {
                    Some(AssistantToolUse {
                        id: non_empty_field(tool_use, "id")?,
                        name: str_field(tool_use, "name").unwrap_or_default(),
                        input: tool_use
                            .get("input")
                            .filter(|input| !input.is_null())
                            .cloned()
                            .unwrap_or_else(|| Value::Object(serde_json::Map::new())),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let thinking = value
        .get("thinking")
        .and_then(Value::as_array)
        .map(|blocks| {
            blocks
                .iter()
                .filter_map(|block| str_field(block, "thinking"))
                .filter(|text| !text.is_empty())
                .collect()
        })
        .unwrap_or_default();

    AssistantFrame {
        content: content_text(value.get("content")).unwrap_or_default(),
        tool_uses,
        thinking,
        model: non_empty_field(value, "model"),
        parent_tool_use_id: non_empty_field(value, "parent_tool_use_id"),
    }
}

fn decode_tool_result(value: &Value) -> ToolResultFrame {
    let results = value
        .get("results")
        .and_then(Value::as_array)
        .map(|results| {
            results
                .iter()
                .filter_map(|entry| {
                    Some(ToolResultEntry {
                        tool_use_id: non_empty_field(entry, "tool_use_id")?,
                        content: content_text(entry.get("content")),
                        is_error: entry
                            .get("is_error")
                            .and_then(Value::as_bool)
                            .unwrap_or(false),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    ToolResultFrame { results }
}

fn decode_result(value: &Value) -> ResultFrame {
    ResultFrame {
        subtype: non_empty_field(value, "subtype"),
        result: str_field(value, "result"),
        is_error: value
            .get("is_error")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        num_turns: u64_field(value, "num_turns").and_then(|turns| u32::try_from(turns).ok()),
        duration_ms: u64_field(value, "duration_ms"),
        duration_api_ms: u64_field(value, "duration_api_ms"),
        total_cost_usd: value
            .get("total_cost_usd")
            .and_then(Value::as_f64)
            .filter(|cost| cost.is_finite()),
        session_id: non_empty_field(value, "session_id"),
        usage: value.get("usage").filter(|usage| !usage.is_null()).cloned(),
    }
}

fn decode_system(value: &Value) -> SystemFrame {
    let subtype = str_field(value, "subtype").unwrap_or_default();
    let lookup = |key: &str| system_field(value, key);

    match subtype.as_str() {
        "init" => SystemFrame::Init {
            session_id: lookup("session_id")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(ToOwned::to_owned),
            model: lookup("model")
                .and_then(Value::as_str)
                .map(ToOwned::to_owned),
        },
        "retry" => SystemFrame::Retry(RetryNotice {
            attempt: lookup("attempt")
                .and_then(Value::as_u64)
                .and_then(|value| u32::try_from(value).ok()),
            max_retries: lookup("max_retries")
                .and_then(Value::as_u64)
                .and_then(|value| u32::try_from(value).ok()),
            delay: lookup("delay").and_then(Value::as_f64),
            error: lookup("error").and_then(|error| content_text(Some(error))),
        }),
        _ => SystemFrame::Other { subtype },
    }
}

/// Fields may sit on the frame itself or inside its `data` object.
fn system_field<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    value
        .get(key)
        .filter(|field| !field.is_null())
        .or_else(|| {
            value
                .get("data")
                .and_then(|data| data.get(key))
                .filter(|field| !field.is_null())
        })
}

fn block_index(value: &Value) -> usize {
    u64_field(value, "block_index")
        .or_else(|| u64_field(value, "index"))
        .and_then(|index| usize::try_from(index).ok())
        .unwrap_or(0)
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(ToOwned::to_owned)
}

fn non_empty_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|field| !field.is_empty())
        .map(ToOwned::to_owned)
}

fn u64_field(value: &Value, key: &str) -> Option<u64> {
    value.get(key).and_then(Value::as_u64)
}

/// Flattens string, text-block array or structured content into display text.
fn content_text(content: Option<&Value>) -> Option<String> {
    match content? {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        Value::Array(items) => {
            let parts: Vec<String> = items
                .iter()
                .filter_map(|item| match item {
                    Value::String(text) => Some(text.clone()),
                    other => str_field(other, "text"),
                })
                .collect();
            Some(parts.join("\n"))
        }
        other => Some(other.to_string()),
    }
}

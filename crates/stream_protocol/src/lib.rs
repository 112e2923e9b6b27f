//! Wire contract and transport for the upstream agent-execution stream.
//!
//! This crate owns decoding of the newline-delimited `data:` record stream into
//! typed [`Frame`]s, the outbound query/interrupt request shapes, and the HTTP
//! client that opens the push stream. It holds no turn or session state; the
//! engine crate consumes frames in transport order.
//!
//! Decoding is total: unknown `type` and `event_type` values decode to
//! `Unknown` variants, and malformed records are logged and dropped by the
//! [`FrameReader`] without stopping the stream.

pub mod client;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod frame;
pub mod payload;
pub mod reader;
pub mod retry;

pub use client::{ByteStream, CancellationSignal, StreamApiClient};
pub use config::StreamApiConfig;
pub use error::StreamApiError;
pub use frame::{
    AssistantFrame, AssistantToolUse, BlockDelta, BlockStart, Frame, FrameError, ResultFrame,
    RetryNotice, StreamEvent, StreamEventFrame, SystemFrame, ToolResultEntry, ToolResultFrame,
};
pub use payload::QueryRequest;
pub use reader::FrameReader;
pub use retry::RetryPolicy;

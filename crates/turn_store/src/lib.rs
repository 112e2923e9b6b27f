//! Append-only persistence of frozen turns, keyed by upstream session id.
//!
//! Each session lives in its own JSONL file: a `session` header line followed by
//! `turn` and `tool_result` records in write order. [`replay`] rebuilds the turn
//! list a live engine would have produced, with late tool results joined back
//! onto their calls.

mod error;
mod memory;
mod paths;
mod replay;
mod schema;
mod store;

pub use error::TurnStoreError;
pub use memory::MemoryTurnStore;
pub use paths::{session_file_name, store_root, ACTIVE_SESSION_FILE};
pub use replay::replay;
pub use schema::{SessionHeader, SessionLog};
pub use store::{now_rfc3339, JsonlTurnStore, TurnStore};

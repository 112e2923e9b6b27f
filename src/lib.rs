//! Streaming session engine for an interactive agent terminal.
//!
//! Invariant: frames are applied in transport order by a single engine, and a
//! frozen turn is never mutated again.
//!
//! # Public API Overview
//! - Drive runs synchronously through [`Engine`]: [`Engine::submit`],
//!   [`Engine::apply`], [`Engine::request_interrupt`], [`Engine::finish_transport`].
//! - Or let [`StreamController`] own the reader tasks, the upstream client and
//!   the persistence writer, and consume [`EngineEvent`]s from its channel.
//! - Configure through [`TerminalConfig`] and install diagnostics with [`logging::init`].
//!
//! Wire decoding lives in `stream_protocol`, turn data in `turn_model`, and the
//! durable log in `turn_store`.

pub mod assembler;
pub mod config;
pub mod controller;
pub mod cost;
mod dispatch;
pub mod engine;
pub mod error;
pub mod events;
mod interrupt;
pub mod logging;
pub mod outbox;
pub mod session;
pub mod turn_builder;

pub use crate::assembler::ToolCallAssembler;
pub use crate::config::{ConfigError, TerminalConfig};
pub use crate::controller::{StreamController, Upstream};
pub use crate::cost::CostAccumulator;
pub use crate::engine::{Engine, Submission, TransportEnd};
pub use crate::error::EngineError;
pub use crate::events::{EngineEvent, RunOutcome, RunSummary};
pub use crate::outbox::{apply_persist_op, spawn_writer, Outbox, PersistOp};
pub use crate::session::{Observation, SessionManager, SessionSettings, SessionState};
pub use crate::turn_builder::TurnBuilder;

//! Line-oriented terminal front end for the `agent_terminal` engine.

pub mod commands;
pub mod render;
pub mod shutdown;

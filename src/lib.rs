//! MESA-OS - a Mars weather and facts chat bot
//!
//! Wires the weather tool, the search session and the agent runtime into a
//! terminal conversation loop.

pub mod personas;
pub mod repl;

pub use repl::{ConversationLoop, LoopExit};

//! Mesa-OS Agent - agent definitions and the tool-calling runtime behind the
//! conversation loop

pub mod agent;
pub mod runner;
pub mod runtime;
pub mod session;

pub use agent::{AgentConfig, ToolChoice};
pub use runner::Runner;
pub use runtime::{AgentRuntime, RuntimeConfig};
pub use session::{Session, SessionKey, SessionRegistry};

use crate::agent::AgentConfig;
use mesa_core::Result;

/// Turns one user utterance into one final answer for a given agent.
///
/// Implementations may call any of the agent's tools along the way and keep
/// whatever conversation memory they like between calls.
#[async_trait::async_trait]
pub trait Runner: Send + Sync {
    async fn run(&self, agent: &AgentConfig, input: &str) -> Result<String>;
}

//! The two agent personas.

use mesa_agent::{AgentConfig, ToolChoice};
use mesa_core::Persona;
use mesa_tools::{ToolRef, ToolRegistry};

pub const WEATHER_AGENT_NAME: &str = "MESA-OS - Martian Environmental Systems Authority";
pub const ASSISTANT_NAME: &str = "Mars Facts Assistant";

const WEATHER_AGENT_PROMPT: &str = include_str!("../prompts/weather_agent.md");
const ASSISTANT_PROMPT: &str = include_str!("../prompts/assistant.md");

/// Weather specialist. Every turn starts with a call to the weather tool.
pub fn weather_agent(weather: ToolRef) -> AgentConfig {
    AgentConfig::new(WEATHER_AGENT_NAME, WEATHER_AGENT_PROMPT)
        .with_tool_choice(ToolChoice::Forced(weather))
}

/// General assistant. Picks freely among `tools`, usually the weather tool
/// plus whatever the search session offers.
pub fn assistant(tools: &ToolRegistry) -> AgentConfig {
    AgentConfig::new(ASSISTANT_NAME, ASSISTANT_PROMPT).with_tools(tools)
}

pub fn for_persona(persona: Persona, weather: ToolRef, tools: &ToolRegistry) -> AgentConfig {
    match persona {
        Persona::Weather => weather_agent(weather),
        Persona::Assistant => assistant(tools),
    }
}

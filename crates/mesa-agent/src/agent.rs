//! Agent definitions: a named persona with instructions, tools and a tool
//! choice policy. Immutable once built.

use mesa_llm::LlmToolChoice;
use mesa_tools::{ToolRef, ToolRegistry};

/// How the model is steered toward tools.
#[derive(Clone, Default)]
pub enum ToolChoice {
    /// The model decides whether and which tool to call.
    #[default]
    Auto,
    /// The model must call this tool before answering.
    Forced(ToolRef),
}

impl ToolChoice {
    /// Provider-level tool choice for the first model call of a turn.
    pub fn to_llm(&self) -> Option<LlmToolChoice> {
        match self {
            Self::Auto => None,
            Self::Forced(tool) => Some(LlmToolChoice::Tool { name: tool.name().to_string() }),
        }
    }

    pub fn is_forced(&self) -> bool {
        matches!(self, Self::Forced(_))
    }
}

impl std::fmt::Debug for ToolChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => f.write_str("Auto"),
            Self::Forced(tool) => f.debug_tuple("Forced").field(&tool.name()).finish(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AgentConfig {
    name: String,
    instructions: String,
    tools: ToolRegistry,
    tool_choice: ToolChoice,
    model: Option<String>,
}

impl AgentConfig {
    pub fn new(name: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instructions: instructions.into(),
            tools: ToolRegistry::new(),
            tool_choice: ToolChoice::Auto,
            model: None,
        }
    }

    pub fn with_tool(mut self, tool: ToolRef) -> Self {
        self.tools.register_ref(tool);
        self
    }

    /// Add every tool of `registry`.
    pub fn with_tools(mut self, registry: &ToolRegistry) -> Self {
        for name in registry.list() {
            if let Some(tool) = registry.get(name) {
                self.tools.register_ref(tool);
            }
        }
        self
    }

    /// Set the tool choice. A forced tool is registered if it is not already.
    pub fn with_tool_choice(mut self, choice: ToolChoice) -> Self {
        if let ToolChoice::Forced(tool) = &choice {
            if !self.tools.contains(tool.name()) {
                self.tools.register_ref(tool.clone());
            }
        }
        self.tool_choice = choice;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn tool_choice(&self) -> &ToolChoice {
        &self.tool_choice
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// Instructions followed by the prompt fragments of the agent's tools.
    pub fn system_prompt(&self) -> String {
        let fragments = self.tools.combined_prompts();
        if fragments.is_empty() {
            self.instructions.clone()
        } else {
            format!("{}\n\n{}", self.instructions, fragments)
        }
    }
}

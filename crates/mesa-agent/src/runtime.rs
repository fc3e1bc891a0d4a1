//! Agent runtime - the tool-calling loop behind `Runner`

use crate::agent::AgentConfig;
use crate::runner::Runner;
use crate::session::{Session, SessionKey, SessionRegistry};
use futures::StreamExt;
use mesa_core::config::{DEFAULT_MAX_TOOL_ITERATIONS, DEFAULT_MODEL};
use mesa_core::{Error, Result};
use mesa_llm::{AccumulatedToolCall, ContentBlock, LlmProvider, LlmRequest, StreamDelta};
use std::sync::Arc;
use tracing::{debug, info, warn};

const MAX_TOOL_RESULT_CHARS: usize = 50_000;

#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    pub default_model: String,
    /// Model calls allowed per turn.
    pub max_tool_iterations: usize,
    pub max_tokens: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            default_model: DEFAULT_MODEL.to_string(),
            max_tool_iterations: DEFAULT_MAX_TOOL_ITERATIONS,
            max_tokens: 4096,
        }
    }
}

pub struct AgentRuntime {
    provider: Arc<dyn LlmProvider>,
    sessions: Arc<SessionRegistry>,
    config: RuntimeConfig,
}

impl AgentRuntime {
    pub fn new(provider: Arc<dyn LlmProvider>, config: RuntimeConfig) -> Self {
        Self {
            provider,
            sessions: Arc::new(SessionRegistry::new()),
            config,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    /// Conversation memory for `agent`, keyed by its name.
    async fn session_for(&self, agent: &AgentConfig) -> Arc<Session> {
        let prompt = agent.system_prompt();
        let session = self
            .sessions
            .get_or_create(&SessionKey::new(agent.name()), Some(&prompt));
        session.set_system_prompt(&prompt).await;
        session
    }

    /// Run one turn: the user message, any number of tool rounds, and the
    /// final answer. A failed turn leaves the session as it was before.
    pub async fn run_turn(&self, agent: &AgentConfig, user_message: &str) -> Result<String> {
        let session = self.session_for(agent).await;
        let checkpoint = session.message_count().await;
        session.add_user_message(user_message).await;

        match self.tool_loop(agent, &session).await {
            Ok(text) => {
                info!(
                    "Turn complete: agent={}, messages={}, tokens≈{}",
                    agent.name(),
                    session.message_count().await,
                    session.token_count().await
                );
                Ok(text)
            }
            Err(e) => {
                session.truncate(checkpoint).await;
                Err(e)
            }
        }
    }

    async fn tool_loop(&self, agent: &AgentConfig, session: &Session) -> Result<String> {
        let definitions = agent.tools().get_definitions();
        let model = agent
            .model()
            .map(String::from)
            .unwrap_or_else(|| self.config.default_model.clone());
        // Forced only on the first call, otherwise the model could never stop.
        let mut tool_choice = agent.tool_choice().to_llm();

        for iteration in 1..=self.config.max_tool_iterations {
            let request = LlmRequest {
                model: model.clone(),
                messages: session.get_messages().await,
                tools: if definitions.is_empty() { None } else { Some(definitions.clone()) },
                tool_choice: tool_choice.take(),
                max_tokens: Some(self.config.max_tokens),
                system: session.system_prompt().await,
                ..Default::default()
            };

            let mut stream = self
                .provider
                .complete_stream(request)
                .await
                .map_err(|e| Error::runner(e.to_string()))?;

            let mut text_content = String::new();
            let mut tool_calls: Vec<AccumulatedToolCall> = Vec::new();
            let mut current_tool: Option<AccumulatedToolCall> = None;
            let mut stop_reason = "end_turn".to_string();

            while let Some(delta) = stream.next().await {
                match delta.map_err(|e| Error::runner(e.to_string()))? {
                    StreamDelta::Text(text) => text_content.push_str(&text),
                    StreamDelta::Thinking(_) => {}
                    StreamDelta::ToolCallStart { id, name } => {
                        current_tool = Some(AccumulatedToolCall { id, name, arguments: String::new() });
                    }
                    StreamDelta::ToolCallDelta { arguments, .. } => {
                        if let Some(ref mut tool) = current_tool { tool.arguments.push_str(&arguments); }
                    }
                    StreamDelta::ToolCallEnd { .. } => {
                        if let Some(tool) = current_tool.take() { tool_calls.push(tool); }
                    }
                    StreamDelta::Done { stop_reason: sr, .. } => {
                        if let Some(r) = sr { stop_reason = r; }
                    }
                    StreamDelta::Error(e) => return Err(Error::runner(e)),
                }
            }

            if tool_calls.is_empty() {
                debug!("{}: done after {} call(s), stop_reason={}", agent.name(), iteration, stop_reason);
                session.add_assistant_text(&text_content).await;
                return Ok(text_content);
            }

            let blocks: Vec<ContentBlock> = tool_calls
                .iter()
                .map(|tc| ContentBlock::ToolUse {
                    id: tc.id.clone(),
                    name: tc.name.clone(),
                    input: tc.parse_arguments().unwrap_or_default(),
                })
                .collect();
            session
                .add_assistant_with_tools(
                    if text_content.is_empty() { None } else { Some(&text_content) },
                    blocks,
                )
                .await;

            for tc in tool_calls {
                let args = match tc.parse_arguments() {
                    Ok(args) => args,
                    Err(e) => {
                        warn!("{}: unparseable arguments for {}: {}", agent.name(), tc.name, e);
                        serde_json::Value::Null
                    }
                };
                debug!("{}: executing {}", agent.name(), tc.name);
                let result = agent.tools().execute(&tc.name, args).await;
                let is_error = result.is_error();
                let content = truncate_result(result.to_content_string());
                session.add_tool_result(&tc.id, &content, is_error).await;
            }

            debug!("Tool calls executed, continuing loop (iteration {})", iteration);
        }

        Err(Error::runner(format!(
            "max tool iterations exceeded ({})",
            self.config.max_tool_iterations
        )))
    }
}

fn truncate_result(content: String) -> String {
    if content.len() <= MAX_TOOL_RESULT_CHARS {
        return content;
    }
    let cut = (0..=MAX_TOOL_RESULT_CHARS)
        .rev()
        .find(|i| content.is_char_boundary(*i))
        .unwrap_or(0);
    format!("{}...\n[truncated, {} total chars]", &content[..cut], content.len())
}

#[async_trait::async_trait]
impl Runner for AgentRuntime {
    async fn run(&self, agent: &AgentConfig, input: &str) -> Result<String> {
        self.run_turn(agent, input).await
    }
}

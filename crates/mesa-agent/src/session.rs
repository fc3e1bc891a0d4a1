//! In-memory conversation sessions, one per agent name

use dashmap::DashMap;
use mesa_llm::{ContentBlock, LlmContent, LlmMessage};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

pub use mesa_core::SessionKey;

const CHARS_PER_TOKEN: f32 = 4.0;

fn estimate_tokens(text: &str) -> usize {
    (text.len() as f32 / CHARS_PER_TOKEN).ceil() as usize
}

fn message_tokens(message: &LlmMessage) -> usize {
    let content = match &message.content {
        LlmContent::Text(s) => estimate_tokens(s),
        LlmContent::Blocks(blocks) => blocks
            .iter()
            .map(|b| match b {
                ContentBlock::Text { text } => estimate_tokens(text),
                ContentBlock::ToolUse { name, input, .. } => {
                    estimate_tokens(name) + estimate_tokens(&input.to_string())
                }
                ContentBlock::ToolResult { content, .. } => estimate_tokens(content),
            })
            .sum(),
    };
    content + 10
}

#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionKey, Arc<Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self { Self::default() }

    pub fn get_or_create(&self, key: &SessionKey, system_prompt: Option<&str>) -> Arc<Session> {
        self.sessions
            .entry(key.clone())
            .or_insert_with(|| {
                debug!("Session {} created", key);
                Arc::new(Session::new(key.clone(), system_prompt))
            })
            .clone()
    }

    pub fn get(&self, key: &SessionKey) -> Option<Arc<Session>> {
        self.sessions.get(key).map(|s| s.clone())
    }
}

pub struct Session {
    pub key: SessionKey,
    system_prompt: RwLock<Option<String>>,
    messages: RwLock<Vec<LlmMessage>>,
}

impl Session {
    pub fn new(key: SessionKey, system_prompt: Option<&str>) -> Self {
        Self {
            key,
            system_prompt: RwLock::new(system_prompt.map(String::from)),
            messages: RwLock::new(Vec::new()),
        }
    }

    pub async fn system_prompt(&self) -> Option<String> { self.system_prompt.read().await.clone() }

    pub async fn set_system_prompt(&self, prompt: &str) {
        *self.system_prompt.write().await = Some(prompt.to_string());
    }

    pub async fn add_user_message(&self, content: &str) {
        self.messages.write().await.push(LlmMessage::user(content));
    }

    pub async fn add_assistant_text(&self, content: &str) {
        self.messages.write().await.push(LlmMessage::assistant(content));
    }

    pub async fn add_assistant_with_tools(&self, text: Option<&str>, tool_calls: Vec<ContentBlock>) {
        let mut blocks = Vec::new();
        if let Some(t) = text {
            if !t.is_empty() { blocks.push(ContentBlock::Text { text: t.to_string() }); }
        }
        blocks.extend(tool_calls);
        let message = LlmMessage { role: "assistant".to_string(), content: LlmContent::Blocks(blocks) };
        self.messages.write().await.push(message);
    }

    /// Record a tool result. All results answering one assistant message go
    /// into a single user message.
    pub async fn add_tool_result(&self, tool_use_id: &str, content: &str, is_error: bool) {
        let block = ContentBlock::ToolResult {
            tool_use_id: tool_use_id.to_string(),
            content: content.to_string(),
            is_error: if is_error { Some(true) } else { None },
        };

        let mut messages = self.messages.write().await;
        if let Some(LlmMessage { role, content: LlmContent::Blocks(blocks) }) = messages.last_mut() {
            if role == "user" && blocks.iter().any(|b| matches!(b, ContentBlock::ToolResult { .. })) {
                blocks.push(block);
                return;
            }
        }
        messages.push(LlmMessage { role: "user".to_string(), content: LlmContent::Blocks(vec![block]) });
    }

    pub async fn get_messages(&self) -> Vec<LlmMessage> { self.messages.read().await.clone() }
    pub async fn message_count(&self) -> usize { self.messages.read().await.len() }

    /// Drop everything after the first `len` messages.
    pub async fn truncate(&self, len: usize) {
        self.messages.write().await.truncate(len);
    }

    /// Rough token estimate of the system prompt plus history.
    pub async fn token_count(&self) -> usize {
        let system = self.system_prompt.read().await.as_deref().map(estimate_tokens).unwrap_or(0);
        let messages = self.messages.read().await;
        system + messages.iter().map(message_tokens).sum::<usize>()
    }
}

//! Anthropic Claude API provider with SSE streaming

use crate::provider::{LlmError, LlmProvider, LlmResult, LlmStream};
use crate::types::{LlmRequest, LlmTool, LlmToolChoice, StreamDelta, Usage};
use eventsource_stream::Eventsource;
use futures::StreamExt;
use mesa_core::Secret;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    client: Client,
    api_key: Option<Secret>,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<Secret>) -> Self {
        Self {
            client: Client::new(),
            api_key: Some(api_key.into()),
            base_url: ANTHROPIC_API_URL.to_string(),
        }
    }

    /// A provider with no credential. Every request fails with `AuthFailed`
    /// without touching the network.
    pub fn without_key() -> Self {
        Self {
            client: Client::new(),
            api_key: None,
            base_url: ANTHROPIC_API_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[async_trait::async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str { "anthropic" }

    fn models(&self) -> &[&str] {
        &[
            "claude-sonnet-4",
            "claude-opus-4",
            "claude-haiku-4-5",
            "claude-3-5-haiku",
        ]
    }

    async fn complete_stream(&self, request: LlmRequest) -> LlmResult<LlmStream> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| LlmError::AuthFailed("ANTHROPIC_API_KEY is not set".into()))?;

        let body = AnthropicRequest {
            model: request.model.clone(),
            messages: request.messages.iter().map(|m| AnthropicMessage {
                role: m.role.clone(),
                content: match &m.content {
                    crate::types::LlmContent::Text(s) => serde_json::json!(s),
                    crate::types::LlmContent::Blocks(blocks) => serde_json::to_value(blocks).unwrap_or_default(),
                },
            }).collect(),
            max_tokens: request.max_tokens.unwrap_or(4096),
            stream: true,
            system: request.system.clone(),
            temperature: request.temperature,
            tools: request.tools.clone(),
            tool_choice: request.tool_choice.clone(),
        };

        debug!(
            "Anthropic request: model={} messages={} tool_choice={:?}",
            body.model,
            body.messages.len(),
            body.tool_choice
        );

        let response = self.client
            .post(&self.base_url)
            .header("x-api-key", api_key.expose())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Anthropic error {}: {}", status, error_text);

            return Err(match status.as_u16() {
                401 => LlmError::AuthFailed(error_text),
                429 => LlmError::RateLimited { retry_after_ms: 60000 },
                _ => LlmError::RequestFailed(format!("{}: {}", status, error_text)),
            });
        }

        let events = response.bytes_stream().eventsource();
        let stream = async_stream::stream! {
            let mut current_tool_id: Option<String> = None;
            tokio::pin!(events);
            while let Some(event) = events.next().await {
                match event {
                    Ok(event) => {
                        if let Some(delta) = parse_event(&event.event, &event.data, &mut current_tool_id) {
                            yield delta;
                        }
                    }
                    Err(e) => {
                        yield Err(LlmError::StreamError(e.to_string()));
                        break;
                    }
                }
            }
        };
        Ok(Box::pin(stream))
    }
}

/// Translate one Anthropic SSE event into a stream delta.
///
/// `current_tool_id` tracks the open `tool_use` block so argument fragments
/// and the closing `content_block_stop` can be attributed to it.
fn parse_event(
    event_type: &str,
    data: &str,
    current_tool_id: &mut Option<String>,
) -> Option<LlmResult<StreamDelta>> {
    if data.is_empty() { return None; }

    match event_type {
        "content_block_start" => {
            let data = serde_json::from_str::<ContentBlockStart>(data).ok()?;
            match data.content_block {
                ContentBlockType::ToolUse { id, name } => {
                    *current_tool_id = Some(id.clone());
                    Some(Ok(StreamDelta::ToolCallStart { id, name }))
                }
                ContentBlockType::Text { .. } | ContentBlockType::Other => None,
            }
        }
        "content_block_delta" => {
            let data = serde_json::from_str::<ContentBlockDelta>(data).ok()?;
            match data.delta {
                DeltaType::TextDelta { text } => Some(Ok(StreamDelta::Text(text))),
                DeltaType::ThinkingDelta { thinking } => Some(Ok(StreamDelta::Thinking(thinking))),
                DeltaType::InputJsonDelta { partial_json } => {
                    current_tool_id.as_ref().map(|id| Ok(StreamDelta::ToolCallDelta {
                        id: id.clone(),
                        arguments: partial_json,
                    }))
                }
                DeltaType::Other => None,
            }
        }
        "content_block_stop" => {
            current_tool_id.take().map(|id| Ok(StreamDelta::ToolCallEnd { id }))
        }
        "message_delta" => {
            let data = serde_json::from_str::<MessageDelta>(data).ok()?;
            data.delta.stop_reason.map(|stop_reason| {
                debug!("Message complete: stop_reason={}", stop_reason);
                Ok(StreamDelta::Done { stop_reason: Some(stop_reason), usage: data.usage })
            })
        }
        "error" => {
            let data = serde_json::from_str::<ErrorEvent>(data).ok()?;
            Some(Err(LlmError::StreamError(data.error.message)))
        }
        _ => None,
    }
}

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    max_tokens: u32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<LlmTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<LlmToolChoice>,
}

#[derive(Serialize)]
struct AnthropicMessage {
    role: String,
    content: serde_json::Value,
}

#[derive(Deserialize)]
struct ContentBlockStart {
    content_block: ContentBlockType,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum ContentBlockType {
    #[serde(rename = "tool_use")]
    ToolUse { id: String, name: String },
    #[serde(rename = "text")]
    #[allow(dead_code)]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct ContentBlockDelta {
    delta: DeltaType,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum DeltaType {
    #[serde(rename = "text_delta")]
    TextDelta { text: String },
    #[serde(rename = "thinking_delta")]
    ThinkingDelta { thinking: String },
    #[serde(rename = "input_json_delta")]
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct MessageDelta {
    delta: MessageDeltaContent,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct MessageDeltaContent {
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEvent {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

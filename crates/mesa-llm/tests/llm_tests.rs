//! Tests for mesa-llm: types, provider trait, and real Anthropic API integration

use mesa_llm::*;

// ===========================================================================
// LlmRequest
// ===========================================================================

#[test]
fn llm_request_default() {
    let req = LlmRequest::default();
    assert!(req.model.contains("claude"));
    assert!(req.messages.is_empty());
    assert!(req.tools.is_none());
    assert!(req.tool_choice.is_none());
    assert_eq!(req.max_tokens, Some(4096));
    assert!(req.temperature.is_none());
    assert!(req.system.is_none());
}

// ===========================================================================
// LlmContent
// ===========================================================================

#[test]
fn llm_content_from_string() {
    let c: LlmContent = "hello".into();
    match c {
        LlmContent::Text(s) => assert_eq!(s, "hello"),
        _ => panic!("Expected Text"),
    }
}

#[test]
fn llm_content_from_owned_string() {
    let c: LlmContent = String::from("world").into();
    match c {
        LlmContent::Text(s) => assert_eq!(s, "world"),
        _ => panic!("Expected Text"),
    }
}

#[test]
fn llm_content_text_serde() {
    let c = LlmContent::Text("hello".into());
    let json = serde_json::to_string(&c).unwrap();
    assert_eq!(json, r#""hello""#);
    let back: LlmContent = serde_json::from_str(&json).unwrap();
    match back {
        LlmContent::Text(s) => assert_eq!(s, "hello"),
        _ => panic!("Expected Text"),
    }
}

#[test]
fn llm_content_blocks_serde() {
    let c = LlmContent::Blocks(vec![
        ContentBlock::Text { text: "hi".into() },
    ]);
    let json = serde_json::to_string(&c).unwrap();
    assert!(json.contains(r#""type":"text""#));
    let back: LlmContent = serde_json::from_str(&json).unwrap();
    match back {
        LlmContent::Blocks(blocks) => {
            assert_eq!(blocks.len(), 1);
            match &blocks[0] {
                ContentBlock::Text { text } => assert_eq!(text, "hi"),
                _ => panic!("Expected Text block"),
            }
        }
        _ => panic!("Expected Blocks"),
    }
}

// ===========================================================================
// ContentBlock
// ===========================================================================

#[test]
fn content_block_text_serde() {
    let b = ContentBlock::Text { text: "hello".into() };
    let json = serde_json::to_string(&b).unwrap();
    assert!(json.contains(r#""type":"text""#));
    let back: ContentBlock = serde_json::from_str(&json).unwrap();
    match back {
        ContentBlock::Text { text } => assert_eq!(text, "hello"),
        _ => panic!("Expected Text"),
    }
}

#[test]
fn content_block_tool_use_serde() {
    let b = ContentBlock::ToolUse {
        id: "tc-1".into(),
        name: "read".into(),
        input: serde_json::json!({"path": "/tmp/foo"}),
    };
    let json = serde_json::to_string(&b).unwrap();
    assert!(json.contains(r#""type":"tool_use""#));
    let back: ContentBlock = serde_json::from_str(&json).unwrap();
    match back {
        ContentBlock::ToolUse { id, name, input } => {
            assert_eq!(id, "tc-1");
            assert_eq!(name, "read");
            assert_eq!(input["path"], "/tmp/foo");
        }
        _ => panic!("Expected ToolUse"),
    }
}

#[test]
fn content_block_tool_result_serde() {
    let b = ContentBlock::ToolResult {
        tool_use_id: "tc-1".into(),
        content: "file contents".into(),
        is_error: Some(false),
    };
    let json = serde_json::to_string(&b).unwrap();
    assert!(json.contains(r#""type":"tool_result""#));
    let back: ContentBlock = serde_json::from_str(&json).unwrap();
    match back {
        ContentBlock::ToolResult { tool_use_id, content, is_error } => {
            assert_eq!(tool_use_id, "tc-1");
            assert_eq!(content, "file contents");
            assert_eq!(is_error, Some(false));
        }
        _ => panic!("Expected ToolResult"),
    }
}

#[test]
fn content_block_tool_result_no_error_skipped() {
    let b = ContentBlock::ToolResult {
        tool_use_id: "tc-1".into(),
        content: "ok".into(),
        is_error: None,
    };
    let json = serde_json::to_string(&b).unwrap();
    assert!(!json.contains("is_error"));
}

// ===========================================================================
// LlmTool
// ===========================================================================

#[test]
fn llm_tool_serde() {
    let tool = LlmTool {
        name: "read".into(),
        description: "Read a file".into(),
        input_schema: serde_json::json!({"type": "object", "properties": {"path": {"type": "string"}}}),
    };
    let json = serde_json::to_string(&tool).unwrap();
    let back: LlmTool = serde_json::from_str(&json).unwrap();
    assert_eq!(back.name, "read");
}

#[test]
fn llm_tool_choice_serde() {
    let forced = LlmToolChoice::Tool { name: "get_mars_weather".into() };
    let json = serde_json::to_value(&forced).unwrap();
    assert_eq!(json, serde_json::json!({"type": "tool", "name": "get_mars_weather"}));

    let auto = serde_json::to_value(LlmToolChoice::Auto).unwrap();
    assert_eq!(auto, serde_json::json!({"type": "auto"}));

    let back: LlmToolChoice = serde_json::from_value(json).unwrap();
    assert_eq!(back, forced);
}

#[test]
fn llm_request_omits_unset_tool_choice() {
    let req = LlmRequest::default();
    let json = serde_json::to_value(&req).unwrap();
    assert!(json.get("tool_choice").is_none());
    assert!(json.get("tools").is_none());
}

// ===========================================================================
// LlmMessage
// ===========================================================================

#[test]
fn llm_message_serde() {
    let msg = LlmMessage {
        role: "user".into(),
        content: LlmContent::Text("hello".into()),
    };
    let json = serde_json::to_string(&msg).unwrap();
    let back: LlmMessage = serde_json::from_str(&json).unwrap();
    assert_eq!(back.role, "user");
}

#[test]
fn llm_message_constructors() {
    let u = LlmMessage::user("hi");
    assert_eq!(u.role, "user");
    let a = LlmMessage::assistant("hello");
    assert_eq!(a.role, "assistant");
    assert!(matches!(a.content, LlmContent::Text(ref t) if t == "hello"));
}

// ===========================================================================
// AccumulatedToolCall
// ===========================================================================

#[test]
fn accumulated_tool_call_parse_valid() {
    let tc = AccumulatedToolCall {
        id: "tc-1".into(),
        name: "read".into(),
        arguments: r#"{"path":"/tmp/foo"}"#.into(),
    };
    let parsed = tc.parse_arguments().unwrap();
    assert_eq!(parsed["path"], "/tmp/foo");
}

#[test]
fn accumulated_tool_call_parse_invalid() {
    let tc = AccumulatedToolCall {
        id: "tc-1".into(),
        name: "read".into(),
        arguments: "not json".into(),
    };
    assert!(tc.parse_arguments().is_err());
}

#[test]
fn accumulated_tool_call_empty_arguments_is_empty_object() {
    let tc = AccumulatedToolCall {
        id: "tc-1".into(),
        name: "get_mars_weather".into(),
        arguments: String::new(),
    };
    assert_eq!(tc.parse_arguments().unwrap(), serde_json::json!({}));
}

#[test]
fn accumulated_tool_call_default() {
    let tc = AccumulatedToolCall::default();
    assert!(tc.id.is_empty());
    assert!(tc.name.is_empty());
    assert!(tc.arguments.is_empty());
}

// ===========================================================================
// Usage
// ===========================================================================

#[test]
fn usage_default() {
    let u = Usage::default();
    assert_eq!(u.input_tokens, 0);
    assert_eq!(u.output_tokens, 0);
}

#[test]
fn usage_serde() {
    let u = Usage { input_tokens: 100, output_tokens: 50 };
    let json = serde_json::to_string(&u).unwrap();
    let back: Usage = serde_json::from_str(&json).unwrap();
    assert_eq!(back.input_tokens, 100);
    assert_eq!(back.output_tokens, 50);
}

// ===========================================================================
// AnthropicProvider - real API integration
// ===========================================================================

fn load_api_key() -> Option<String> {
    std::env::var("ANTHROPIC_API_KEY").ok().filter(|k| !k.trim().is_empty())
}

#[tokio::test]
async fn anthropic_provider_simple_text_response() {
    let api_key = match load_api_key() {
        Some(k) => k,
        None => { eprintln!("SKIP: no ANTHROPIC_API_KEY"); return; }
    };

    let provider = AnthropicProvider::new(api_key.as_str());
    assert_eq!(provider.name(), "anthropic");
    assert!(provider.models().len() > 0);

    let request = LlmRequest {
        model: "claude-3-5-haiku-latest".into(),
        messages: vec![LlmMessage {
            role: "user".into(),
            content: LlmContent::Text("Reply with exactly the word 'pong' and nothing else.".into()),
        }],
        max_tokens: Some(32),
        ..Default::default()
    };

    use futures::StreamExt;
    let stream = provider.complete_stream(request).await.expect("API call failed");
    tokio::pin!(stream);

    let mut text = String::new();
    let mut got_done = false;

    while let Some(result) = stream.next().await {
        match result.expect("Stream error") {
            StreamDelta::Text(t) => text.push_str(&t),
            StreamDelta::Done { .. } => got_done = true,
            _ => {}
        }
    }

    let lower = text.to_lowercase();
    assert!(lower.contains("pong"), "Expected 'pong' in response, got: {}", text);
    assert!(got_done, "Never received Done delta");
}

#[tokio::test]
async fn anthropic_provider_with_tools() {
    let api_key = match load_api_key() {
        Some(k) => k,
        None => { eprintln!("SKIP: no ANTHROPIC_API_KEY"); return; }
    };

    let provider = AnthropicProvider::new(api_key.as_str());

    let request = LlmRequest {
        model: "claude-3-5-haiku-latest".into(),
        messages: vec![LlmMessage {
            role: "user".into(),
            content: LlmContent::Text("Use the get_mars_weather tool for sol 675.".into()),
        }],
        tools: Some(vec![LlmTool {
            name: "get_mars_weather".into(),
            description: "Get Mars weather for a sol".into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "sol": {"type": "string", "description": "Sol number or 'latest'"}
                },
                "required": ["sol"]
            }),
        }]),
        tool_choice: Some(LlmToolChoice::Tool { name: "get_mars_weather".into() }),
        max_tokens: Some(256),
        ..Default::default()
    };

    use futures::StreamExt;
    let stream = provider.complete_stream(request).await.expect("API call failed");
    tokio::pin!(stream);

    let mut got_tool_start = false;
    let mut tool_name = String::new();
    let mut tool_args = String::new();
    let mut got_tool_end = false;

    while let Some(result) = stream.next().await {
        match result.expect("Stream error") {
            StreamDelta::ToolCallStart { name, .. } => {
                got_tool_start = true;
                tool_name = name;
            }
            StreamDelta::ToolCallDelta { arguments, .. } => {
                tool_args.push_str(&arguments);
            }
            StreamDelta::ToolCallEnd { .. } => {
                got_tool_end = true;
            }
            _ => {}
        }
    }

    assert!(got_tool_start, "Expected tool call start");
    assert_eq!(tool_name, "get_mars_weather");
    assert!(got_tool_end, "Expected tool call end");

    // Parse accumulated arguments
    let args: serde_json::Value = serde_json::from_str(&tool_args)
        .unwrap_or_else(|e| panic!("Failed to parse tool args '{}': {}", tool_args, e));
    let sol = args["sol"].as_str().unwrap_or("");
    assert!(sol.contains("675"), "Expected 675 in args, got: {}", sol);
}

#[tokio::test]
async fn anthropic_provider_without_key_fails_fast() {
    let provider = AnthropicProvider::without_key().with_base_url("http://127.0.0.1:1/v1/messages");
    let result = provider.complete_stream(LlmRequest::default()).await;
    assert!(matches!(result, Err(LlmError::AuthFailed(_))));
}

#[tokio::test]
async fn anthropic_provider_bad_key_fails() {
    if load_api_key().is_none() {
        eprintln!("SKIP: no ANTHROPIC_API_KEY (offline)");
        return;
    }
    let provider = AnthropicProvider::new("sk-bad-key-12345");

    let request = LlmRequest {
        model: "claude-3-5-haiku-latest".into(),
        messages: vec![LlmMessage {
            role: "user".into(),
            content: LlmContent::Text("hello".into()),
        }],
        max_tokens: Some(16),
        ..Default::default()
    };

    let result = provider.complete_stream(request).await;
    assert!(result.is_err(), "Expected error with bad API key");
}

#[test]
fn anthropic_provider_supports_model() {
    let provider = AnthropicProvider::new("fake");
    assert!(provider.supports_model("claude-sonnet-4-20250514"));
    assert!(!provider.supports_model("gpt-4"));
}

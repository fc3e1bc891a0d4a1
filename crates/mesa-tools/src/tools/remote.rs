//! Proxy for a tool that lives on the other side of a search session.

use crate::mcp::{RemoteToolDef, SearchSession};
use crate::registry::{Tool, ToolResult};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::warn;

pub struct RemoteTool {
    session: Arc<SearchSession>,
    name: String,
    description: String,
    input_schema: Value,
}

impl RemoteTool {
    pub fn new(session: Arc<SearchSession>, def: RemoteToolDef) -> Self {
        Self {
            session,
            description: def.description.unwrap_or_else(|| def.name.clone()),
            input_schema: def
                .input_schema
                .unwrap_or_else(|| json!({"type": "object", "properties": {}})),
            name: def.name,
        }
    }
}

#[async_trait::async_trait]
impl Tool for RemoteTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> Value {
        self.input_schema.clone()
    }

    async fn execute(&self, args: Value) -> ToolResult {
        match self.session.invoke(&self.name, args).await {
            Ok(text) => ToolResult::Text(text),
            Err(e) => {
                warn!("remote tool {} failed: {}", self.name, e);
                ToolResult::error(e.to_string())
            }
        }
    }
}

//! Mesa-OS tools: the Mars weather tool, the search session, and the
//! registry both are exposed through.

pub mod mcp;
pub mod registry;
pub mod tools;

pub use mcp::{RemoteSession, RemoteToolDef, SearchEndpoint, SearchSession, SearchSessionConfig, SessionState};
pub use registry::{Tool, ToolRef, ToolRegistry, ToolResult};
pub use tools::remote::RemoteTool;
pub use tools::weather::WeatherTool;

use std::sync::Arc;

/// Registry holding only the weather tool.
pub fn weather_registry(weather: Arc<WeatherTool>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register_ref(weather);
    registry
}

/// Registry with the weather tool plus every tool the search session offers.
/// A session that cannot list its tools contributes nothing.
pub async fn assistant_registry(weather: Arc<WeatherTool>, search: Option<&Arc<SearchSession>>) -> ToolRegistry {
    let mut registry = weather_registry(weather);
    if let Some(session) = search {
        match session.remote_tools().await {
            Ok(remote) => {
                for tool in remote {
                    registry.register(tool);
                }
            }
            Err(e) => tracing::warn!("search tools unavailable: {}", e),
        }
    }
    registry
}

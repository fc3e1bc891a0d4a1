//! Search session - a Model Context Protocol client over streamable HTTP.
//!
//! Lifecycle: `Unconnected -> Connected -> Closed`. `Closed` is terminal.
//! Every JSON-RPC request is a POST to the endpoint; the server may answer
//! with plain JSON or with an SSE-framed body. The server-issued
//! `Mcp-Session-Id` is echoed on every later request and used to terminate
//! the session with a DELETE on close.
//!
//! The API key is never part of the stored URL. It is attached as a query
//! parameter when each request is built.

use mesa_core::{Error, Result, Secret};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::tools::remote::RemoteTool;

const PROTOCOL_VERSION: &str = "2025-03-26";
const SESSION_HEADER: &str = "Mcp-Session-Id";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A long-lived remote session that must be closed exactly once.
#[async_trait::async_trait]
pub trait RemoteSession: Send + Sync {
    fn name(&self) -> &str;

    /// Tear the session down. Safe to call more than once.
    async fn close(&self) -> Result<()>;
}

/// Where the search service lives and how to authenticate to it.
#[derive(Clone, Debug)]
pub struct SearchEndpoint {
    pub url: String,
    pub api_key: Option<Secret>,
    /// Query parameter that carries the key.
    pub key_param: String,
}

impl SearchEndpoint {
    pub fn new(url: impl Into<String>, api_key: Option<Secret>) -> Self {
        Self {
            url: url.into(),
            api_key,
            key_param: "exaApiKey".to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct SearchSessionConfig {
    pub name: String,
    pub endpoint: SearchEndpoint,
    pub timeout: Duration,
    /// Keep the first `tools/list` answer for the lifetime of the session.
    pub cache_tools_list: bool,
}

impl SearchSessionConfig {
    pub fn new(name: impl Into<String>, endpoint: SearchEndpoint) -> Self {
        Self {
            name: name.into(),
            endpoint,
            timeout: DEFAULT_TIMEOUT,
            cache_tools_list: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Unconnected,
    Connected,
    Closed,
}

impl SessionState {
    fn label(self) -> &'static str {
        match self {
            Self::Unconnected => "unconnected",
            Self::Connected => "connected",
            Self::Closed => "closed",
        }
    }
}

/// A tool advertised by the remote server.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteToolDef {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub input_schema: Option<Value>,
}

// --- JSON-RPC wire types ---

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<u64>,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ToolsListResult {
    tools: Vec<RemoteToolDef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallToolResult {
    #[serde(default)]
    content: Vec<CallToolContent>,
    #[serde(default)]
    is_error: bool,
}

#[derive(Debug, Deserialize)]
struct CallToolContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

impl CallToolResult {
    fn text(&self) -> String {
        self.content
            .iter()
            .filter(|c| c.kind == "text")
            .filter_map(|c| c.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Collect the `data:` payloads of an SSE body, one entry per event.
fn sse_payloads(body: &str) -> Vec<String> {
    let mut payloads = Vec::new();
    let mut data: Option<String> = None;

    for line in body.lines().chain(std::iter::once("")) {
        if line.is_empty() {
            if let Some(done) = data.take() {
                payloads.push(done);
            }
            continue;
        }
        if let Some(rest) = line.strip_prefix("data:") {
            let rest = rest.strip_prefix(' ').unwrap_or(rest);
            match data.as_mut() {
                Some(buf) => {
                    buf.push('\n');
                    buf.push_str(rest);
                }
                None => data = Some(rest.to_string()),
            }
        }
    }
    payloads
}

/// Pick the JSON-RPC response for request `id` out of the payloads of one
/// HTTP answer. Server notifications interleaved in the stream are skipped.
fn select_response(payloads: &[String], id: u64) -> Result<RpcResponse> {
    let mut fallback = None;
    for payload in payloads {
        let Ok(response) = serde_json::from_str::<RpcResponse>(payload) else {
            continue;
        };
        if response.id.as_ref().and_then(Value::as_u64) == Some(id) {
            return Ok(response);
        }
        if response.result.is_some() || response.error.is_some() {
            fallback = Some(response);
        }
    }
    fallback.ok_or_else(|| Error::Internal(format!("no JSON-RPC response for request {}", id)))
}

fn describe(e: reqwest::Error) -> String {
    e.without_url().to_string()
}

pub struct SearchSession {
    name: String,
    client: reqwest::Client,
    endpoint: SearchEndpoint,
    cache_tools_list: bool,
    state: RwLock<SessionState>,
    session_id: RwLock<Option<String>>,
    cached_tools: RwLock<Option<Vec<RemoteToolDef>>>,
    next_id: AtomicU64,
    lifecycle: Mutex<()>,
}

impl std::fmt::Debug for SearchSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchSession")
            .field("name", &self.name)
            .field("url", &self.endpoint.url)
            .field("state", &self.state())
            .finish()
    }
}

impl SearchSession {
    pub fn new(config: SearchSessionConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .build()
            .map_err(|e| Error::Connection(describe(e)))?;
        Ok(Self {
            name: config.name,
            client,
            endpoint: config.endpoint,
            cache_tools_list: config.cache_tools_list,
            state: RwLock::new(SessionState::Unconnected),
            session_id: RwLock::new(None),
            cached_tools: RwLock::new(None),
            next_id: AtomicU64::new(1),
            lifecycle: Mutex::new(()),
        })
    }

    pub fn state(&self) -> SessionState {
        self.state.read().map(|s| *s).unwrap_or(SessionState::Closed)
    }

    pub fn has_cached_tools(&self) -> bool {
        self.cached_tools.read().map(|c| c.is_some()).unwrap_or(false)
    }

    fn set_state(&self, next: SessionState) -> Result<()> {
        *self
            .state
            .write()
            .map_err(|e| Error::Internal(format!("Lock poisoned: {e}")))? = next;
        Ok(())
    }

    fn require(&self, operation: &str, wanted: SessionState) -> Result<()> {
        let state = self.state();
        if state == wanted {
            return Ok(());
        }
        if state == SessionState::Closed {
            tracing::error!("{}: {} called after close", self.name, operation);
        }
        Err(Error::invalid_state(operation, state.label()))
    }

    fn current_session_id(&self) -> Option<String> {
        self.session_id.read().ok().and_then(|s| s.clone())
    }

    fn remember_session_id(&self, response: &reqwest::Response) {
        let Some(sid) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        else {
            return;
        };
        if let Ok(mut slot) = self.session_id.write() {
            *slot = Some(sid.to_string());
        }
    }

    /// Build a request with the credential and session header attached.
    fn request(&self, method: reqwest::Method) -> Result<reqwest::RequestBuilder> {
        let key = self.endpoint.api_key.as_ref().ok_or_else(|| {
            Error::Connection(format!("{}: search API key is not set", self.name))
        })?;
        let mut builder = self
            .client
            .request(method, &self.endpoint.url)
            .query(&[(self.endpoint.key_param.as_str(), key.expose())])
            .header("Accept", "application/json, text/event-stream");
        if let Some(sid) = self.current_session_id() {
            builder = builder.header(SESSION_HEADER, sid);
        }
        Ok(builder)
    }

    async fn rpc(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = RpcRequest { jsonrpc: "2.0", id: Some(id), method, params };
        debug!("{}: -> {} (id={})", self.name, method, id);

        let response = self
            .request(reqwest::Method::POST)?
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Connection(describe(e)))?;
        self.remember_session_id(&response);

        let status = response.status();
        let is_sse = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("text/event-stream"));
        let text = response.text().await.map_err(|e| Error::Connection(describe(e)))?;

        if !status.is_success() {
            return Err(Error::remote_service(&self.name, status.as_u16(), text));
        }

        let reply = if is_sse {
            select_response(&sse_payloads(&text), id)?
        } else {
            serde_json::from_str::<RpcResponse>(&text)?
        };

        if let Some(err) = reply.error {
            return Err(Error::Internal(format!("JSON-RPC error {}: {}", err.code, err.message)));
        }
        reply
            .result
            .ok_or_else(|| Error::Internal(format!("{} response has neither result nor error", method)))
    }

    async fn notify(&self, method: &str) -> Result<()> {
        let body = RpcRequest { jsonrpc: "2.0", id: None, method, params: None };
        let response = self
            .request(reqwest::Method::POST)?
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Connection(describe(e)))?;
        self.remember_session_id(&response);

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::remote_service(&self.name, status.as_u16(), text));
        }
        Ok(())
    }

    async fn fetch_tools(&self) -> Result<Vec<RemoteToolDef>> {
        let result = self.rpc("tools/list", None).await?;
        Ok(serde_json::from_value::<ToolsListResult>(result)?.tools)
    }

    /// Open the session: initialize, acknowledge, and optionally cache the
    /// remote tool list. Valid only from `Unconnected`.
    pub async fn connect(&self) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        self.require("connect", SessionState::Unconnected)?;

        let handshake = async {
            self.rpc(
                "initialize",
                Some(json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": "mesa-os",
                        "version": env!("CARGO_PKG_VERSION")
                    }
                })),
            )
            .await?;
            self.notify("notifications/initialized").await?;
            if self.cache_tools_list {
                let tools = self.fetch_tools().await?;
                if let Ok(mut cache) = self.cached_tools.write() {
                    *cache = Some(tools);
                }
            }
            Ok::<_, Error>(())
        };

        match handshake.await {
            Ok(()) => {
                self.set_state(SessionState::Connected)?;
                info!("{}: connected to {}", self.name, self.endpoint.url);
                Ok(())
            }
            Err(Error::Connection(msg)) => Err(Error::Connection(msg)),
            Err(e) => Err(Error::Connection(format!("{}: {}", self.name, e))),
        }
    }

    /// Remote tool catalogue. Served from the cache when one was taken at
    /// connect time; the cache is never refreshed.
    pub async fn list_tools(&self) -> Result<Vec<RemoteToolDef>> {
        self.require("list tools", SessionState::Connected)?;
        if let Some(cached) = self.cached_tools.read().ok().and_then(|c| c.clone()) {
            return Ok(cached);
        }
        self.fetch_tools().await
    }

    /// Call a remote tool and return its text content.
    pub async fn invoke(&self, tool: &str, arguments: Value) -> Result<String> {
        self.require("invoke", SessionState::Connected)?;

        // Servers expect an object, never null.
        let arguments = if arguments.is_null() { json!({}) } else { arguments };
        let result = self
            .rpc("tools/call", Some(json!({ "name": tool, "arguments": arguments })))
            .await
            .map_err(|e| Error::tool_invocation(tool, e.to_string()))?;
        let result: CallToolResult = serde_json::from_value(result)
            .map_err(|e| Error::tool_invocation(tool, e.to_string()))?;

        if result.is_error {
            return Err(Error::tool_invocation(tool, result.text()));
        }
        Ok(result.text())
    }

    /// Wrap every remote tool in a proxy that can sit in a `ToolRegistry`.
    pub async fn remote_tools(self: &Arc<Self>) -> Result<Vec<RemoteTool>> {
        Ok(self
            .list_tools()
            .await?
            .into_iter()
            .map(|def| RemoteTool::new(Arc::clone(self), def))
            .collect())
    }

    /// Move to `Closed` and ask the server to drop the session. A second call
    /// is a no-op. A failed DELETE is reported but the session stays closed.
    pub async fn close(&self) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        let previous = self.state();
        if previous == SessionState::Closed {
            debug!("{}: close called on a closed session", self.name);
            return Ok(());
        }
        self.set_state(SessionState::Closed)?;

        let sid = self.session_id.write().ok().and_then(|mut s| s.take());
        let Some(sid) = sid else {
            debug!("{}: closed ({} before, nothing to terminate)", self.name, previous.label());
            return Ok(());
        };

        let response = self
            .request(reqwest::Method::DELETE)?
            .header(SESSION_HEADER, sid)
            .send()
            .await
            .map_err(|e| Error::Connection(describe(e)))?;

        let status = response.status();
        // 405: the server does not let clients terminate sessions.
        if status.is_success() || status == reqwest::StatusCode::METHOD_NOT_ALLOWED {
            info!("{}: session closed", self.name);
            Ok(())
        } else {
            Err(Error::remote_service(&self.name, status.as_u16(), "session termination rejected"))
        }
    }
}

#[async_trait::async_trait]
impl RemoteSession for SearchSession {
    fn name(&self) -> &str {
        &self.name
    }

    async fn close(&self) -> Result<()> {
        SearchSession::close(self).await
    }
}

impl Drop for SearchSession {
    fn drop(&mut self) {
        if self.state() == SessionState::Connected {
            warn!("{}: dropped while still connected", self.name);
        }
    }
}

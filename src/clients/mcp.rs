//! Blockscout MCP client (streamable HTTP transport, JSON-RPC 2.0)

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::raw::{RawAddressInfo, RawChain, RawTokenBalance, RawTransfer};
use super::TransferSource;
use crate::error::{ClientError, Result};
use crate::models::{AddressInfo, Chain, DataSource, TokenBalance, TransferPage, TransferQuery};
use crate::utils::time::normalize;
use crate::utils::MetricsService;

const PROTOCOL_VERSION: &str = "2025-03-26";
const SESSION_HEADER: &str = "mcp-session-id";
const UNLOCK_TOOL: &str = "__unlock_blockchain_analysis__";

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    #[serde(default)]
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ToolResult {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default, rename = "isError")]
    is_error: bool,
    #[serde(default, rename = "structuredContent")]
    structured_content: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// Envelope every Blockscout MCP tool answers with
#[derive(Debug, Deserialize)]
struct ToolResponse<T> {
    data: T,
    #[serde(default)]
    pagination: Option<Pagination>,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    #[serde(default)]
    next_call: Option<NextCall>,
}

#[derive(Debug, Deserialize)]
struct NextCall {
    #[serde(default)]
    params: HashMap<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ItemList<T> {
    List(Vec<T>),
    Wrapped { items: Vec<T> },
}

impl<T> ItemList<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            ItemList::List(v) => v,
            ItemList::Wrapped { items } => items,
        }
    }
}

struct McpSession {
    id: Option<String>,
}

/// Session-based client for the Blockscout MCP server.
///
/// `connect` must succeed before any query. The session is a single
/// connection: calls hold the session lock for their whole round trip, so
/// concurrent callers are serialized.
pub struct McpClient {
    http: reqwest::Client,
    endpoint: String,
    session: Mutex<Option<McpSession>>,
    next_id: AtomicU64,
    metrics: Arc<MetricsService>,
}

impl McpClient {
    pub fn new(http: reqwest::Client, endpoint: &str, metrics: Arc<MetricsService>) -> Self {
        Self {
            http,
            endpoint: endpoint.to_string(),
            session: Mutex::new(None),
            next_id: AtomicU64::new(1),
            metrics,
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.session.lock().await.is_some()
    }

    async fn post(
        &self,
        session_id: Option<&str>,
        body: Value,
    ) -> Result<(Option<String>, Option<RpcResponse>)> {
        let started = Instant::now();
        let mut request = self
            .http
            .post(&self.endpoint)
            .header(ACCEPT, "application/json, text/event-stream")
            .json(&body);
        if let Some(id) = session_id {
            request = request.header(SESSION_HEADER, id);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                let label = if e.is_timeout() { "timeout" } else { "error" };
                self.metrics.record_request("mcp", label, started.elapsed());
                return Err(e.into());
            }
        };

        let status = response.status();
        self.metrics
            .record_request("mcp", status.as_str(), started.elapsed());
        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                url: self.endpoint.clone(),
            });
        }

        let session = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response.text().await?;

        if body.trim().is_empty() {
            return Ok((session, None));
        }
        Ok((session, Some(parse_rpc_body(&content_type, &body)?)))
    }

    async fn rpc(&self, session_id: Option<&str>, method: &str, params: Value) -> Result<(Option<String>, Value)> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let (session, response) = self.post(session_id, body).await?;
        let response = response
            .ok_or_else(|| ClientError::InvalidResponse(format!("empty reply to {}", method)))?;
        if let Some(error) = response.error {
            return Err(ClientError::Mcp(format!("{} ({})", error.message, error.code)));
        }
        let result = response
            .result
            .ok_or_else(|| ClientError::InvalidResponse(format!("{} returned no result", method)))?;
        Ok((session, result))
    }

    async fn notify(&self, session_id: Option<&str>, method: &str) -> Result<()> {
        let body = json!({"jsonrpc": "2.0", "method": method});
        self.post(session_id, body).await?;
        Ok(())
    }

    async fn call_tool_in(&self, session_id: Option<&str>, name: &str, arguments: Value) -> Result<Value> {
        debug!(target: "MCP", "tools/call {} {}", name, arguments);
        let (_, result) = self
            .rpc(session_id, "tools/call", json!({"name": name, "arguments": arguments}))
            .await?;
        let result: ToolResult = serde_json::from_value(result)?;

        let text: String = result
            .content
            .iter()
            .filter(|c| c.kind == "text")
            .filter_map(|c| c.text.as_deref())
            .collect();

        if result.is_error {
            return Err(ClientError::Mcp(format!("{} failed: {}", name, text)));
        }
        if let Some(structured) = result.structured_content {
            return Ok(structured);
        }
        serde_json::from_str(&text)
            .map_err(|e| ClientError::InvalidResponse(format!("{} returned non-JSON content: {}", name, e)))
    }

    /// Call a tool on the open session
    async fn call_tool<T: DeserializeOwned>(&self, name: &str, arguments: Value) -> Result<ToolResponse<T>> {
        let guard = self.session.lock().await;
        let session = guard.as_ref().ok_or(ClientError::NotConnected)?;
        let value = self.call_tool_in(session.id.as_deref(), name, arguments).await?;
        Ok(serde_json::from_value(value)?)
    }
}

/// Decode a JSON-RPC reply sent either as plain JSON or as an SSE stream
fn parse_rpc_body(content_type: &str, body: &str) -> Result<RpcResponse> {
    if !content_type.contains("text/event-stream") {
        return Ok(serde_json::from_str(body)?);
    }

    sse_payloads(body)
        .iter()
        .rev()
        .filter_map(|payload| serde_json::from_str::<RpcResponse>(payload).ok())
        .find(|r| r.result.is_some() || r.error.is_some())
        .ok_or_else(|| ClientError::InvalidResponse("event stream carried no JSON-RPC reply".into()))
}

fn sse_payloads(body: &str) -> Vec<String> {
    let mut events = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in body.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                events.push(current.join("\n"));
                current.clear();
            }
            continue;
        }
        if let Some(data) = line.strip_prefix("data:") {
            current.push(data.strip_prefix(' ').unwrap_or(data));
        }
    }
    if !current.is_empty() {
        events.push(current.join("\n"));
    }
    events
}

#[async_trait]
impl TransferSource for McpClient {
    fn kind(&self) -> DataSource {
        DataSource::Mcp
    }

    async fn connect(&self) -> Result<()> {
        let mut guard = self.session.lock().await;
        if guard.is_some() {
            return Ok(());
        }

        info!(target: "MCP", "Opening MCP session at {}", self.endpoint);

        let (session_id, _) = self
            .rpc(
                None,
                "initialize",
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {"name": "chainwhale", "version": env!("CARGO_PKG_VERSION")},
                }),
            )
            .await?;

        self.notify(session_id.as_deref(), "notifications/initialized")
            .await?;
        self.call_tool_in(session_id.as_deref(), UNLOCK_TOOL, json!({}))
            .await?;

        *guard = Some(McpSession { id: session_id });
        info!(target: "MCP", "MCP session ready");
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let session = self.session.lock().await.take();
        if let Some(McpSession { id: Some(id) }) = session {
            match self
                .http
                .delete(&self.endpoint)
                .header(SESSION_HEADER, &id)
                .send()
                .await
            {
                Ok(response) => debug!(target: "MCP", "Session {} closed ({})", id, response.status()),
                Err(e) => debug!(target: "MCP", "Session {} close failed: {}", id, e),
            }
        }
        Ok(())
    }

    async fn get_address_info(&self, chain_id: &str, address: &str) -> Result<AddressInfo> {
        let response: ToolResponse<Value> = self
            .call_tool("get_address_info", json!({"chain_id": chain_id, "address": address}))
            .await?;
        let raw = RawAddressInfo::from_value(response.data)?;
        Ok(raw.into_address_info(address, DataSource::Mcp))
    }

    async fn get_token_transfers(&self, query: &TransferQuery) -> Result<TransferPage> {
        let mut arguments = json!({
            "chain_id": query.chain_id,
            "age_from": normalize(&query.age_from),
            "age_to": normalize(&query.age_to),
        });
        if let Some(address) = &query.address {
            arguments["address"] = json!(address);
        }
        if let Some(token) = &query.token {
            arguments["token"] = json!(token);
        }
        if let Some(cursor) = &query.cursor {
            arguments["cursor"] = json!(cursor);
        }

        let response: ToolResponse<ItemList<RawTransfer>> = self
            .call_tool("get_token_transfers_by_address", arguments)
            .await?;

        let next_cursor = response
            .pagination
            .and_then(|p| p.next_call)
            .and_then(|call| call.params.get("cursor").and_then(Value::as_str).map(String::from));
        let items = response
            .data
            .into_vec()
            .into_iter()
            .map(|raw| raw.into_transfer(DataSource::Mcp))
            .collect();

        Ok(TransferPage { items, next_cursor })
    }

    async fn get_tokens_by_address(&self, chain_id: &str, address: &str) -> Result<Vec<TokenBalance>> {
        let response: ToolResponse<ItemList<RawTokenBalance>> = self
            .call_tool("get_tokens_by_address", json!({"chain_id": chain_id, "address": address}))
            .await?;
        Ok(response
            .data
            .into_vec()
            .into_iter()
            .map(RawTokenBalance::into_balance)
            .collect())
    }

    async fn get_chains_list(&self) -> Result<Vec<Chain>> {
        let response: ToolResponse<Vec<RawChain>> =
            self.call_tool("get_chains_list", json!({})).await?;
        Ok(response.data.into_iter().map(RawChain::into_chain).collect())
    }
}

//! MCP client session: the handshake plus `tools/list` and `tools/call`
//! on top of an [`RpcClient`].

use crate::protocol::{
    Implementation, InitializeParams, InitializeResult, ToolCallParams, ToolCallResult,
    ToolListResult,
};
use crate::rpc::RpcClient;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use shopdesk_core::error::ToolError;
use shopdesk_core::provider::ToolDefinition;
use shopdesk_core::tool::ToolGateway;
use std::time::Instant;
use tokio::io::{AsyncBufRead, AsyncWrite};
use tracing::{info, warn};

/// What the client announces during `initialize`.
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    pub protocol_version: String,
    pub name: String,
    pub version: String,
}

impl From<&shopdesk_config::SidecarConfig> for ClientIdentity {
    fn from(config: &shopdesk_config::SidecarConfig) -> Self {
        Self {
            protocol_version: config.protocol_version.clone(),
            name: config.client_name.clone(),
            version: config.client_version.clone(),
        }
    }
}

pub struct McpSession<W, R> {
    rpc: RpcClient<W, R>,
}

fn decode<T: DeserializeOwned>(method: &str, value: Value) -> Result<T, ToolError> {
    serde_json::from_value(value)
        .map_err(|e| ToolError::Protocol(format!("unexpected {method} result: {e}")))
}

impl<W, R> McpSession<W, R>
where
    W: AsyncWrite + Unpin + Send + 'static,
    R: AsyncBufRead + Unpin + Send + 'static,
{
    pub fn new(rpc: RpcClient<W, R>) -> Self {
        Self { rpc }
    }

    /// Perform the `initialize` exchange and acknowledge it with
    /// `notifications/initialized`. Must precede any other call.
    pub async fn initialize(&self, identity: &ClientIdentity) -> Result<InitializeResult, ToolError> {
        let params = InitializeParams {
            protocol_version: identity.protocol_version.clone(),
            capabilities: Map::new(),
            client_info: Implementation {
                name: identity.name.clone(),
                version: identity.version.clone(),
            },
        };
        let params = serde_json::to_value(params)
            .map_err(|e| ToolError::Protocol(format!("encode initialize: {e}")))?;

        let result = self.rpc.request("initialize", Some(params)).await?;
        let result: InitializeResult = decode("initialize", result)?;
        self.rpc.notify("notifications/initialized", None).await?;

        info!(
            server = %result.server_info.name,
            server_version = %result.server_info.version,
            protocol = %result.protocol_version,
            "Tool sidecar initialized"
        );
        Ok(result)
    }

    /// Close the outbound stream.
    pub async fn close(&self) -> Result<(), ToolError> {
        self.rpc.close().await
    }
}

#[async_trait]
impl<W, R> ToolGateway for McpSession<W, R>
where
    W: AsyncWrite + Unpin + Send + 'static,
    R: AsyncBufRead + Unpin + Send + 'static,
{
    async fn call_tool(&self, name: &str, arguments: &Map<String, Value>) -> Result<String, ToolError> {
        let started = Instant::now();
        let params = serde_json::to_value(ToolCallParams {
            name: name.to_string(),
            arguments: arguments.clone(),
        })
        .map_err(|e| ToolError::Protocol(format!("encode tools/call: {e}")))?;

        let result = self.rpc.request("tools/call", Some(params)).await?;
        let result: ToolCallResult = decode("tools/call", result)?;

        let text = result
            .first_text()
            .ok_or_else(|| ToolError::EmptyResult { tool: name.to_string() })?
            .to_string();

        if result.is_error {
            warn!(tool = name, result = %text, "Tool reported an error");
        }
        info!(tool = name, elapsed_ms = started.elapsed().as_millis() as u64, "Tool call finished");
        Ok(text)
    }

    async fn list_tools(&self) -> Result<Vec<ToolDefinition>, ToolError> {
        let result = self.rpc.request("tools/list", Some(serde_json::json!({}))).await?;
        let result: ToolListResult = decode("tools/list", result)?;
        Ok(result
            .tools
            .into_iter()
            .map(|tool| ToolDefinition {
                name: tool.name,
                description: tool.description,
                parameters: tool.input_schema,
            })
            .collect())
    }
}

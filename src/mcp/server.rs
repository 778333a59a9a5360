//! MCP Server implementation
//!
//! Implements the Model Context Protocol server for stdio transport. Tool calls run as
//! independent tasks, so a slow mailbox request never holds up other agents; responses are
//! written by a single writer task as they complete.

use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use crate::error::Result;
use crate::gmail::types::CallerId;
use crate::mcp::tools::ToolHandler;
use crate::mcp::types::*;

/// MCP Server info
const SERVER_NAME: &str = "gmail-agent-tools";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// MCP Server for Gmail
pub struct McpServer {
    /// Tool handler
    tool_handler: ToolHandler,

    /// Agent assumed when a tool call does not name one
    default_agent: CallerId,
}

impl McpServer {
    /// Create a new MCP server
    pub fn new(tool_handler: ToolHandler, default_agent: CallerId) -> Self {
        Self {
            tool_handler,
            default_agent,
        }
    }

    /// Run the server on stdio
    pub async fn run_stdio(self: Arc<Self>) -> Result<()> {
        self.run(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Serve newline-delimited JSON-RPC from `reader`, answering on `writer`
    ///
    /// Returns once the input ends and every pending tool call has answered.
    pub async fn run<R, W>(self: Arc<Self>, reader: R, writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel::<JsonRpcResponse>();
        let writer_task = tokio::spawn(write_responses(rx, writer));

        let mut lines = BufReader::new(reader).lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            let request: JsonRpcRequest = match serde_json::from_str(&line) {
                Ok(request) => request,
                Err(e) => {
                    let _ = tx.send(JsonRpcResponse::error(
                        None,
                        JsonRpcError::parse_error(e.to_string()),
                    ));
                    continue;
                }
            };

            if request.method == methods::CALL_TOOL {
                let server = Arc::clone(&self);
                let tx = tx.clone();
                tokio::spawn(async move {
                    let response = server.handle_call_tool(request).await;
                    let _ = tx.send(response);
                });
            } else if let Some(response) = self.handle_request(request) {
                let _ = tx.send(response);
            }
        }

        drop(tx);
        writer_task
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?
    }

    /// Handle every method except `tools/call`
    fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        match request.method.as_str() {
            methods::INITIALIZE => Some(self.respond(request.id, self.initialize_result())),
            methods::INITIALIZED => {
                tracing::info!("MCP client initialized");
                None
            }
            methods::PING => Some(JsonRpcResponse::success(request.id, serde_json::json!({}))),
            methods::LIST_TOOLS => {
                let result = ListToolsResult {
                    tools: self.tool_handler.list_tools(),
                };
                Some(self.respond(request.id, serde_json::to_value(result)))
            }
            // notifications never get an answer
            _ if request.id.is_none() => None,
            _ => Some(JsonRpcResponse::error(
                request.id,
                JsonRpcError::method_not_found(&request.method),
            )),
        }
    }

    fn initialize_result(&self) -> serde_json::Result<Value> {
        serde_json::to_value(InitializeResult {
            protocol_version: MCP_VERSION.to_string(),
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: SERVER_VERSION.to_string(),
            },
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {}),
            },
        })
    }

    fn respond(&self, id: Option<RequestId>, result: serde_json::Result<Value>) -> JsonRpcResponse {
        match result {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(e) => JsonRpcResponse::error(id, JsonRpcError::invalid_params(e.to_string())),
        }
    }

    /// Handle call tool request
    async fn handle_call_tool(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let params: CallToolParams = match request.params {
            Some(p) => match serde_json::from_value(p) {
                Ok(params) => params,
                Err(e) => {
                    return JsonRpcResponse::error(
                        request.id,
                        JsonRpcError::invalid_params(format!("Invalid tool parameters: {}", e)),
                    );
                }
            },
            None => {
                return JsonRpcResponse::error(
                    request.id,
                    JsonRpcError::invalid_params("Missing tool parameters"),
                );
            }
        };

        let caller = params
            .meta
            .and_then(|meta| meta.agent_id)
            .map(CallerId::new)
            .unwrap_or_else(|| self.default_agent.clone());

        let result = self
            .tool_handler
            .call_tool(&caller, &params.name, params.arguments)
            .await;
        self.respond(request.id, serde_json::to_value(result))
    }
}

async fn write_responses<W>(
    mut rx: mpsc::UnboundedReceiver<JsonRpcResponse>,
    mut writer: W,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        let mut line = serde_json::to_string(&response)?;
        line.push('\n');
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
    }
    Ok(())
}

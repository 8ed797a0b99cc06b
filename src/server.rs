//! MCP server implementation.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::{self, AbortHandle, JoinError, JoinSet};
use tracing::Instrument;

use crate::dispatch::Dispatcher;
use crate::error::{codes, Error, Result};
use crate::protocol::{
    negotiate_protocol_version, CancelledParams, InitializeParams, InitializeResult, JsonRpcId,
    JsonRpcRequest, JsonRpcResponse, ListToolsResult, McpMessage, ServerCapabilities, ServerInfo,
    ToolCallParams, ToolsCapability,
};

/// Server name.
pub const SERVER_NAME: &str = "ui-bridge-mcp";

/// Server version.
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

const INSTRUCTIONS: &str = "Tools prefixed ui_ drive the runner's own UI; sdk_ tools drive an \
app connected with sdk_connect (one at a time). Take a snapshot with agent_mode=true to get \
short @eN refs usable wherever an element id is expected. extension_ tools are deprecated.";

/// MCP server state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Waiting for initialization.
    Uninitialized,
    /// Server is initialized and ready.
    Ready,
    /// Server is shutting down.
    ShuttingDown,
}

/// MCP server for the UI Bridge runner.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct McpServer {
    state: Arc<RwLock<ServerState>>,
    dispatcher: Arc<Dispatcher>,
    in_flight: Arc<Mutex<HashMap<JsonRpcId, AbortHandle>>>,
}

impl McpServer {
    /// Create a server around `dispatcher`.
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            state: Arc::new(RwLock::new(ServerState::Uninitialized)),
            dispatcher: Arc::new(dispatcher),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The dispatcher serving tool calls.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> ServerState {
        *self.state.read().await
    }

    /// Run the server on stdio.
    #[cfg(feature = "stdio")]
    pub async fn run_stdio(&self) -> Result<()> {
        tracing::info!("MCP server starting on stdio");
        self.run(tokio::io::stdin(), tokio::io::stdout()).await?;
        tracing::info!("MCP server shutting down");
        Ok(())
    }

    /// Serve line-delimited JSON-RPC from `reader`, answering on `writer`.
    ///
    /// Tool calls run as separate tasks; everything else is answered in
    /// order. Returns once input ends (or the client shuts the server down)
    /// and every in-flight call has answered. A call whose task panics is
    /// answered with an internal error; a cancelled call is not answered.
    pub async fn run<R, W>(&self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel::<JsonRpcResponse>();
        let writer_task = tokio::spawn(write_responses(writer, rx));

        let mut lines = BufReader::new(reader).lines();
        let mut tasks = JoinSet::new();
        let mut calls = HashMap::new();

        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            tracing::debug!("Received: {}", line);

            let ready = self.state().await == ServerState::Ready;
            match McpMessage::parse(line) {
                Ok(McpMessage::Request(request)) if ready && request.method == "tools/call" => {
                    self.spawn_tool_call(request, &tx, &mut tasks, &mut calls).await;
                }
                message => {
                    if let Some(response) = self.route(message).await {
                        // The writer only stops once every sender is gone.
                        let _ = tx.send(response);
                    }
                }
            }

            while let Some(joined) = tasks.try_join_next_with_id() {
                self.reap(joined, &mut calls, &tx).await;
            }

            if self.state().await == ServerState::ShuttingDown {
                break;
            }
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            self.reap(joined, &mut calls, &tx).await;
        }
        drop(tx);

        writer_task
            .await
            .map_err(|e| Error::Internal(format!("writer task failed: {e}")))?
    }

    async fn spawn_tool_call(
        &self,
        request: JsonRpcRequest,
        tx: &mpsc::UnboundedSender<JsonRpcResponse>,
        tasks: &mut JoinSet<()>,
        calls: &mut HashMap<task::Id, JsonRpcId>,
    ) {
        let Some(id) = request.id.clone() else {
            return;
        };

        // Held across spawn so the task cannot deregister before it is registered.
        let mut in_flight = self.in_flight.lock().await;
        if in_flight.contains_key(&id) {
            tracing::warn!(id = %id, "Rejecting tool call with an id already in flight");
            let _ = tx.send(JsonRpcResponse::error(
                Some(id.clone()),
                codes::INVALID_REQUEST,
                format!("request id {id} is already in flight"),
            ));
            return;
        }

        let server = self.clone();
        let tx = tx.clone();
        let span = tracing::info_span!("tool_call", id = %id);
        let request_id = id.clone();
        let handle = tasks.spawn(
            async move {
                let response = server
                    .handle_tools_call(Some(request_id.clone()), request.params)
                    .await;
                server.deregister(&request_id, task::id()).await;
                let _ = tx.send(response);
            }
            .instrument(span),
        );
        calls.insert(handle.id(), id.clone());
        in_flight.insert(id, handle);
    }

    /// Forget `id` if it is still registered to `task`.
    async fn deregister(&self, id: &JsonRpcId, task: task::Id) {
        let mut in_flight = self.in_flight.lock().await;
        if in_flight.get(id).is_some_and(|handle| handle.id() == task) {
            in_flight.remove(id);
        }
    }

    /// Account for a finished tool-call task.
    async fn reap(
        &self,
        joined: std::result::Result<(task::Id, ()), JoinError>,
        calls: &mut HashMap<task::Id, JsonRpcId>,
        tx: &mpsc::UnboundedSender<JsonRpcResponse>,
    ) {
        let (task, panicked) = match joined {
            Ok((task, ())) => (task, false),
            Err(e) => (e.id(), e.is_panic()),
        };
        let Some(id) = calls.remove(&task) else {
            return;
        };
        // Cancelled calls were deregistered by the cancellation.
        if panicked {
            self.deregister(&id, task).await;
            tracing::error!(id = %id, "Tool call panicked");
            let _ = tx.send(JsonRpcResponse::error(
                Some(id),
                codes::INTERNAL_ERROR,
                "tool call failed unexpectedly",
            ));
        }
    }

    /// Handle an incoming message.
    pub async fn handle_message(&self, json: &str) -> Option<JsonRpcResponse> {
        self.route(McpMessage::parse(json)).await
    }

    async fn route(&self, message: Result<McpMessage>) -> Option<JsonRpcResponse> {
        match message {
            Ok(McpMessage::Request(request)) => Some(self.handle_request(request).await),
            Ok(McpMessage::Notification(notification)) => {
                self.handle_notification(notification).await;
                None
            }
            Ok(McpMessage::Response(_)) => {
                // We don't expect responses in this direction
                None
            }
            Err(e) => Some(JsonRpcResponse::error(None, e.code(), e.to_string())),
        }
    }

    /// Handle a JSON-RPC request.
    async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id.clone();

        match request.method.as_str() {
            "initialize" => self.handle_initialize(id, request.params).await,
            "tools/list" => self.handle_tools_list(id).await,
            "tools/call" => self.handle_tools_call(id, request.params).await,
            "ping" => JsonRpcResponse::success(id, serde_json::json!({})),
            "shutdown" => {
                *self.state.write().await = ServerState::ShuttingDown;
                JsonRpcResponse::success(id, serde_json::json!({}))
            }
            _ => JsonRpcResponse::error(
                id,
                codes::METHOD_NOT_FOUND,
                format!("method not found: {}", request.method),
            ),
        }
    }

    /// Handle a notification (no response expected).
    async fn handle_notification(&self, notification: JsonRpcRequest) {
        match notification.method.as_str() {
            "notifications/initialized" => {
                tracing::info!("Client initialized");
            }
            "notifications/cancelled" => {
                let params = notification
                    .params
                    .map(serde_json::from_value::<CancelledParams>);
                match params {
                    Some(Ok(params)) => self.cancel(params).await,
                    _ => tracing::debug!("Ignoring malformed cancellation"),
                }
            }
            "exit" => {
                *self.state.write().await = ServerState::ShuttingDown;
            }
            _ => {
                tracing::debug!("Unknown notification: {}", notification.method);
            }
        }
    }

    async fn cancel(&self, params: CancelledParams) {
        let handle = self.in_flight.lock().await.remove(&params.request_id);
        match handle {
            Some(handle) => {
                handle.abort();
                tracing::info!(
                    id = %params.request_id,
                    reason = params.reason.as_deref().unwrap_or("none"),
                    "Tool call cancelled"
                );
            }
            None => tracing::debug!(id = %params.request_id, "Nothing to cancel"),
        }
    }

    /// Handle initialize request.
    async fn handle_initialize(
        &self,
        id: Option<JsonRpcId>,
        params: Option<serde_json::Value>,
    ) -> JsonRpcResponse {
        let params: InitializeParams = match params {
            Some(p) => match serde_json::from_value(p) {
                Ok(params) => params,
                Err(e) => {
                    return JsonRpcResponse::error(
                        id,
                        codes::INVALID_PARAMS,
                        format!("invalid initialize params: {}", e),
                    );
                }
            },
            None => {
                return JsonRpcResponse::error(
                    id,
                    codes::INVALID_PARAMS,
                    "initialize params required",
                );
            }
        };

        let protocol_version = negotiate_protocol_version(&params.protocol_version);
        tracing::info!(
            client = %params.client_info.name,
            client_version = %params.client_info.version,
            requested = %params.protocol_version,
            protocol_version,
            "Initializing"
        );

        *self.state.write().await = ServerState::Ready;

        let result = InitializeResult {
            protocol_version: protocol_version.into(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: false,
                }),
            },
            server_info: ServerInfo {
                name: SERVER_NAME.into(),
                version: SERVER_VERSION.into(),
            },
            instructions: Some(INSTRUCTIONS.into()),
        };

        JsonRpcResponse::success(id, result)
    }

    /// Handle tools/list request.
    async fn handle_tools_list(&self, id: Option<JsonRpcId>) -> JsonRpcResponse {
        if self.state().await != ServerState::Ready {
            return JsonRpcResponse::error(id, codes::INTERNAL_ERROR, "server not initialized");
        }

        let tools = self.dispatcher.registry().list_tools();
        JsonRpcResponse::success(id, ListToolsResult { tools })
    }

    /// Handle tools/call request.
    async fn handle_tools_call(
        &self,
        id: Option<JsonRpcId>,
        params: Option<serde_json::Value>,
    ) -> JsonRpcResponse {
        if self.state().await != ServerState::Ready {
            return JsonRpcResponse::error(id, codes::INTERNAL_ERROR, "server not initialized");
        }

        let params: ToolCallParams = match params {
            Some(p) => match serde_json::from_value(p) {
                Ok(params) => params,
                Err(e) => {
                    return JsonRpcResponse::error(
                        id,
                        codes::INVALID_PARAMS,
                        format!("invalid tool call params: {}", e),
                    );
                }
            },
            None => {
                return JsonRpcResponse::error(
                    id,
                    codes::INVALID_PARAMS,
                    "tool call params required",
                );
            }
        };

        let result = self
            .dispatcher
            .dispatch(&params.name, params.arguments)
            .await;
        JsonRpcResponse::success(id, result.into_call_result())
    }
}

async fn write_responses<W>(
    mut writer: W,
    mut rx: mpsc::UnboundedReceiver<JsonRpcResponse>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        let json = serde_json::to_string(&response)?;
        tracing::debug!("Sending: {}", json);
        writer.write_all(json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    Ok(())
}

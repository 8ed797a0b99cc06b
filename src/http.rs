//! Streamable-HTTP style transport: one JSON-RPC message per POST.
//!
//! Each `tools/call` is answered in the body of its own POST, so it runs to
//! completion inside that request. Such calls are never in flight as far as
//! the server is concerned: `notifications/cancelled` is accepted but has no
//! effect on them. A client that wants to stop a call closes its request.

use std::net::SocketAddr;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::Result;
use crate::server::{McpServer, SERVER_NAME, SERVER_VERSION};

/// Router serving `POST /mcp` and `GET /healthz`.
pub fn router(server: McpServer) -> Router {
    Router::new()
        .route("/mcp", post(handle_mcp))
        .route("/healthz", get(healthz))
        .with_state(server)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

/// Serve `server` over HTTP until the listener fails.
pub async fn serve(server: McpServer, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "MCP server listening on HTTP");
    axum::serve(listener, router(server)).await?;
    Ok(())
}

async fn handle_mcp(State(server): State<McpServer>, body: String) -> Response {
    match server.handle_message(&body).await {
        Some(response) => Json(response).into_response(),
        // notifications get no body
        None => StatusCode::ACCEPTED.into_response(),
    }
}

async fn healthz(State(server): State<McpServer>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "name": SERVER_NAME,
        "version": SERVER_VERSION,
        "tools": server.dispatcher().registry().len(),
    }))
}

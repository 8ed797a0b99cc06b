//! # ui-bridge-mcp
//!
//! MCP (Model Context Protocol) server that lets AI agents drive UIs through
//! the UI Bridge runner.
//!
//! The runner owns element discovery and input injection. This crate is a
//! thin routing layer in front of it: it keeps a registry of typed tools,
//! tracks which SDK app (if any) is connected, forwards each call over HTTP,
//! and turns every outcome into a uniform MCP tool result.
//!
//! ## Tool families
//!
//! - `ui_*`: the runner's own webview (`/ui-bridge/control/*`)
//! - `sdk_*`: an app embedding the UI Bridge SDK (`/ui-bridge/sdk/*`);
//!   requires `sdk_connect` first
//! - `extension_*`: deprecated Chrome-extension bridge (`/extension/*`)
//!
//! ## Usage with VS Code
//!
//! Add to your `.vscode/mcp.json`:
//!
//! ```json
//! {
//!   "servers": {
//!     "ui-bridge": {
//!       "command": "ui-bridge-mcp",
//!       "env": { "QONTINUI_RUNNER_PORT": "9876" }
//!     }
//!   }
//! }
//! ```
//!
//! ## Embedding
//!
//! ```no_run
//! use std::sync::Arc;
//! use ui_bridge_mcp::{Dispatcher, HttpBackend, McpServer, RunnerConfig, ToolRegistry};
//!
//! # async fn run() -> ui_bridge_mcp::Result<()> {
//! let config = RunnerConfig::new(None, 9876);
//! let backend = Arc::new(HttpBackend::new(&config)?);
//! let dispatcher = Dispatcher::new(ToolRegistry::builtin()?, backend);
//! McpServer::new(dispatcher).run_stdio().await
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod agent;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
#[cfg(feature = "http")]
pub mod http;
pub mod normalize;
pub mod protocol;
pub mod server;
pub mod session;
pub mod tools;

pub use client::{Backend, BackendRequest, BackendResponse, HttpBackend};
pub use config::RunnerConfig;
pub use dispatch::Dispatcher;
pub use error::{Error, ErrorKind, Result};
pub use normalize::{ToolOutput, ToolResult};
pub use protocol::{JsonRpcRequest, JsonRpcResponse, McpMessage};
pub use server::McpServer;
pub use session::{SessionState, SessionStatus};
pub use tools::{ToolMode, ToolRegistry, ToolSpec};

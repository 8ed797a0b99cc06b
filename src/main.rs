//! ui-bridge-mcp - MCP server for the UI Bridge runner
//!
//! This binary exposes the runner's UI automation API as MCP tools for AI
//! assistants like GitHub Copilot and Claude Desktop.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ui_bridge_mcp::config::{DEFAULT_DISCOVERY_TIMEOUT, DEFAULT_RUNNER_PORT, DEFAULT_TIMEOUT};
use ui_bridge_mcp::server::{SERVER_NAME, SERVER_VERSION};
use ui_bridge_mcp::{Dispatcher, HttpBackend, McpServer, RunnerConfig, ToolRegistry};

/// MCP server bridging AI agents to the UI Bridge runner.
#[derive(Parser, Debug)]
#[command(name = "ui-bridge-mcp")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Runner host. Defaults to the Windows host under WSL2, else localhost.
    #[arg(long, env = "QONTINUI_RUNNER_HOST")]
    host: Option<String>,

    /// Runner port.
    #[arg(long, env = "QONTINUI_RUNNER_PORT", default_value_t = DEFAULT_RUNNER_PORT)]
    port: u16,

    /// Timeout for a runner request, in seconds.
    #[arg(
        long,
        env = "UI_BRIDGE_TIMEOUT_SECS",
        default_value_t = DEFAULT_TIMEOUT.as_secs(),
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    timeout_secs: u64,

    /// Timeout for element discovery, in seconds.
    #[arg(
        long,
        env = "UI_BRIDGE_DISCOVERY_TIMEOUT_SECS",
        default_value_t = DEFAULT_DISCOVERY_TIMEOUT.as_secs(),
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    discovery_timeout_secs: u64,

    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Log output file (default: stderr).
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    log_json: bool,

    /// Serve MCP over HTTP on this address instead of stdio.
    #[cfg(feature = "http")]
    #[arg(long, value_name = "ADDR")]
    http: Option<std::net::SocketAddr>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_logging(&args) {
        eprintln!("ui-bridge-mcp: {e:#}");
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(()) => {
            tracing::info!("Server exited cleanly");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("Server error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Logs never go to stdout, which carries the protocol.
fn init_logging(args: &Args) -> anyhow::Result<()> {
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let writer = match args.log_file {
        Some(ref path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };
    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(args.log_file.is_none());

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer.json())
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer)
            .try_init()?;
    }
    Ok(())
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = RunnerConfig::new(args.host.clone(), args.port)
        .with_timeout(Duration::from_secs(args.timeout_secs))
        .with_discovery_timeout(Duration::from_secs(args.discovery_timeout_secs));

    tracing::info!(
        runner = %config.base_url(),
        timeout_secs = args.timeout_secs,
        discovery_timeout_secs = args.discovery_timeout_secs,
        "Starting {} v{}",
        SERVER_NAME,
        SERVER_VERSION
    );

    let backend = Arc::new(HttpBackend::new(&config).context("cannot create runner client")?);
    let registry = ToolRegistry::builtin()?;
    tracing::info!(tools = registry.len(), "Tools registered");

    let dispatcher =
        Dispatcher::new(registry, backend).with_discovery_timeout(config.discovery_timeout);
    serve(McpServer::new(dispatcher), &args).await
}

#[cfg(feature = "http")]
async fn serve(server: McpServer, args: &Args) -> anyhow::Result<()> {
    match args.http {
        Some(addr) => Ok(ui_bridge_mcp::http::serve(server, addr).await?),
        None => serve_stdio(server).await,
    }
}

#[cfg(not(feature = "http"))]
async fn serve(server: McpServer, _args: &Args) -> anyhow::Result<()> {
    serve_stdio(server).await
}

#[cfg(feature = "stdio")]
async fn serve_stdio(server: McpServer) -> anyhow::Result<()> {
    Ok(server.run_stdio().await?)
}

#[cfg(not(feature = "stdio"))]
async fn serve_stdio(_server: McpServer) -> anyhow::Result<()> {
    anyhow::bail!("built without the stdio transport; pass --http <ADDR>")
}

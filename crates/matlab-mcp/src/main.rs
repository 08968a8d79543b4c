//! # MATLAB MCP Server
//!
//! Model Context Protocol server for AI agents to drive MATLAB engine
//! sessions.
//!
//! ## Overview
//!
//! This server provides MCP tools for:
//! - Session management (open, list, close)
//! - Command evaluation with captured output
//! - Workspace variable exchange
//! - Console visibility and output buffer control
//!
//! ## Architecture
//!
//! This is the top layer - the MCP server binary that ties together:
//! - matlab-mcp-core: Core types and configuration
//! - matlab-mcp-loader: Runtime loading of the native libraries
//! - matlab-mcp-session: Engine sessions and the session pool

use anyhow::Context;
use rmcp::{transport::stdio, ServiceExt};

use matlab_mcp::MatlabMcpServer;
use matlab_mcp_core::{ConsoleWindowStatus, ServerConfig};

const USAGE: &str = "Usage: matlab-mcp [--config <path>] [--show-console | --hide-console]";

fn load_config(args: &[String]) -> anyhow::Result<ServerConfig> {
    let mut config = match args.iter().position(|arg| arg == "--config") {
        Some(index) => {
            let path = args
                .get(index + 1)
                .with_context(|| format!("--config requires a path\n{USAGE}"))?;
            ServerConfig::from_file(path)
                .with_context(|| format!("Failed to load configuration from {path}"))?
        }
        None => ServerConfig::default(),
    };

    if args.iter().any(|arg| arg == "--show-console") {
        config.engine.console = ConsoleWindowStatus::Show;
    }
    if args.iter().any(|arg| arg == "--hide-console") {
        config.engine.console = ConsoleWindowStatus::Hide;
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        eprintln!("{USAGE}");
        return Ok(());
    }

    let config = load_config(&args)?;

    // Initialize logging (stdout carries MCP traffic)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.server.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(
        "MATLAB MCP Server v{} starting (console: {})...",
        env!("CARGO_PKG_VERSION"),
        config.engine.console
    );

    // Discovery and the library probe run here, before serving
    let server = MatlabMcpServer::from_config(&config);

    tracing::info!("Server initialized, starting stdio transport...");

    // Serve the MCP server over stdio
    let service = server.serve(stdio()).await.map_err(|e| {
        tracing::error!("Error starting server: {}", e);
        e
    })?;

    tracing::info!("MATLAB MCP Server running on stdio");

    // Wait for the service to complete
    service.waiting().await?;

    tracing::info!("MATLAB MCP Server shutting down");

    Ok(())
}

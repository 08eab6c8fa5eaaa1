//! Entry point for the swesh MCP server.
//!
//! Initializes tracing (to stderr, so it doesn't interfere with MCP stdio
//! transport), parses CLI flags, and serves on stdin/stdout.

use anyhow::Result;
use rmcp::{transport::stdio, ServiceExt};
use swesh::config::Cli;
use swesh::server::SweshServer;
use tracing_subscriber::{self, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse(std::env::args().skip(1)).unwrap_or_else(|e| {
        eprintln!("error: {e}");
        std::process::exit(2);
    });

    if cli.show_version {
        println!("swesh {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    tracing::info!("starting swesh session runtime v{}", env!("CARGO_PKG_VERSION"));
    // The HTTP transport (host/port/auth-token) is out of scope for this
    // runtime; these are parsed and logged for operator visibility only.
    tracing::info!(
        host = %cli.host,
        port = cli.port,
        auth_token_set = !cli.auth_token.is_empty(),
        "configured transport settings are not bound; serving over MCP stdio"
    );

    let server = SweshServer::new();
    let service = server.serve(stdio()).await.inspect_err(|e| {
        tracing::error!("serving error: {:?}", e);
    })?;

    service.waiting().await?;
    tracing::info!("swesh server shut down");
    Ok(())
}

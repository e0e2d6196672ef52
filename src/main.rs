use anyhow::Result;
use common::server::NixScoutServer;
use rmcp::transport::stdio;
use rmcp::ServiceExt;
use tracing_subscriber::{self, EnvFilter};
mod common;
mod sources;

/// NixScout MCP Server - search, info, and stats tools over Nix ecosystem data sources
/// Run with: cargo run --features transport-io
/// Test with: npx @modelcontextprotocol/inspector cargo run --features transport-io
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize the tracing subscriber with stderr logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    tracing::info!("Starting NixScout MCP Server");

    #[cfg(feature = "transport-io")]
    let service = NixScoutServer::new()?
        .serve(stdio())
        .await
        .inspect_err(|e| {
            tracing::error!("serving error: {:?}", e);
        })?;

    #[cfg(not(feature = "transport-io"))]
    compile_error!("`transport-io` feature is required for this server to run.");

    tracing::info!("NixScout MCP Server is ready and waiting for connections");

    #[cfg(feature = "transport-io")]
    service.waiting().await?;
    Ok(())
}

//! Thingy:52 MCP bridge server.
//!
//! Main entry point: serves the tool surface over stdio.

use rmcp::{transport::stdio, ServiceExt};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use thingy_mcp::ble::btle::BtleTransport;
use thingy_mcp::ble::session::Session;
use thingy_mcp::ble::types::SessionConfig;
use thingy_mcp::server::ThingyServer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // stdout carries MCP frames, so log output goes to stderr.
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting thingy-mcp v{}", env!("CARGO_PKG_VERSION"));

    let transport = Arc::new(BtleTransport::new().await?);
    let session = Session::new(transport, SessionConfig::default());

    let service = ThingyServer::new(session).serve(stdio()).await?;
    service.waiting().await?;

    Ok(())
}

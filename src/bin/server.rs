//! Binance MCP server
//!
//! Run with: binance-mcp-server [--transport stdio|http]

use std::sync::Arc;

use anyhow::{ Context, Result };
use clap::Parser;
use tracing::info;

use binance_mcp::Server;
use binance_mcp::config::{ ServerCli, TransportKind };
use binance_mcp::handlers::{ ActivityLog, PriceApi, binance_registry };
use binance_mcp::logging;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = ServerCli::parse();
    logging::init(cli.verbose, cli.quiet);

    let log = Arc::new(ActivityLog::new(&cli.activity_log));
    log.ensure_exists().await.with_context(||
        format!("Failed to create activity log {}", cli.activity_log.display())
    )?;

    let api = Arc::new(PriceApi::new(cli.price_api_config(), Arc::clone(&log))?);
    let registry = binance_registry(api, log)?;

    let server = Server::builder()
        .name("Binance MCP")
        .version(env!("CARGO_PKG_VERSION"))
        .registry(registry)
        .tool_timeout(cli.tool_timeout())
        .build();

    match cli.transport {
        TransportKind::Stdio => {
            tokio::select! {
                result = server.serve_stdio() => result?,
                _ = tokio::signal::ctrl_c() => info!("Interrupted, shutting down"),
            }
        }
        TransportKind::Http => {
            let handle = server.serve_http(cli.http_options()).await?;
            info!("Serving Binance MCP on {}", handle.url());
            tokio::signal::ctrl_c().await.context("Failed to listen for ctrl-c")?;
            handle.shutdown().await?;
        }
    }

    Ok(())
}

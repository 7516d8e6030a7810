//! Binance MCP client
//!
//! Run with: binance-mcp-client [--url URL | --server-command CMD] [TOOL] [key=value...]

use anyhow::{ Context, Result };
use clap::Parser;

use binance_mcp::Client;
use binance_mcp::config::ClientCli;
use binance_mcp::logging;

async fn describe(client: &Client) -> Result<()> {
    let info = client.server_info();
    println!("Connected to {} {} (protocol {})", info.name, info.version, client.protocol_version());

    let capabilities = &client.negotiated().capabilities;

    println!("\nTools:");
    for tool in client.list_tools().await? {
        println!("  {} - {}", tool.name, tool.description);
    }

    if capabilities.resources.is_some() {
        println!("\nResources:");
        for resource in client.list_resources().await? {
            println!("  {} ({})", resource.uri, resource.name);
        }
        for template in client.list_resource_templates().await? {
            println!("  {} ({})", template.uri_template, template.name);
        }
    }

    if capabilities.prompts.is_some() {
        println!("\nPrompts:");
        for prompt in client.list_prompts().await? {
            let arguments: Vec<&str> = prompt.arguments
                .iter()
                .map(|a| a.name.as_str())
                .collect();
            println!("  {}({})", prompt.name, arguments.join(", "));
        }
    }

    Ok(())
}

async fn call(client: &Client, cli: &ClientCli, tool: &str) -> Result<()> {
    // Listing first enables local argument validation
    client.list_tools().await?;
    let output = client.call_tool(tool, cli.tool_arguments()?).await?;
    match &output.structured {
        Some(value) => println!("{}", serde_json::to_string_pretty(value)?),
        None => println!("{}", output.text().unwrap_or_default()),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = ClientCli::parse();
    logging::init(cli.verbose, cli.quiet);

    let client = Client::connect(&cli.transport_config(), cli.client_config()).await.context(
        "Failed to connect to server"
    )?;

    let result = match &cli.tool {
        Some(tool) => call(&client, &cli, tool).await,
        None => describe(&client).await,
    };

    client.shutdown().await?;
    result
}

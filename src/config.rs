//! Command line configuration for the server and client binaries
//!
//! Every server option has an environment fallback so the server can be
//! configured the same way under a process supervisor or a container.

use std::path::PathBuf;
use std::time::Duration;

use clap::{ ArgAction, Parser, ValueEnum };
use serde_json::{ Map, Value };

use crate::client::ClientConfig;
use crate::errors::Error;
use crate::handlers::price::{ DEFAULT_API_URL, DEFAULT_DATA_URL, PriceApiConfig };
use crate::transport::{ HttpServerOptions, TransportConfig };

/// How the server talks to its client
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransportKind {
    /// Newline-delimited JSON on stdin/stdout
    Stdio,
    /// Streamable HTTP on `host:port/mcp`
    Http,
}

#[derive(Parser, Debug)]
#[command(name = "binance-mcp-server")]
#[command(about = "Model Context Protocol server for Binance price lookups", version)]
pub struct ServerCli {
    /// Transport to serve on
    #[arg(long, env = "MCP_TRANSPORT", value_enum, default_value = "stdio")]
    pub transport: TransportKind,

    /// Interface to bind for the HTTP transport
    #[arg(long, env = "MCP_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port for the HTTP transport
    #[arg(long, env = "MCP_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Base URL of the Binance price API
    #[arg(long, env = "BINANCE_API_URL", default_value = DEFAULT_API_URL)]
    pub binance_api_url: String,

    /// Base URL of the Binance market data API
    #[arg(long, env = "BINANCE_DATA_URL", default_value = DEFAULT_DATA_URL)]
    pub binance_data_url: String,

    /// File recording every price lookup
    #[arg(long, env = "ACTIVITY_LOG_FILE", default_value = "activity.log")]
    pub activity_log: PathBuf,

    /// Abort tool calls that run longer than this
    #[arg(long)]
    pub tool_timeout_secs: Option<u64>,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long)]
    pub quiet: bool,
}

impl ServerCli {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn tool_timeout(&self) -> Option<Duration> {
        self.tool_timeout_secs.map(Duration::from_secs)
    }

    pub fn price_api_config(&self) -> PriceApiConfig {
        PriceApiConfig {
            api_url: self.binance_api_url.clone(),
            data_url: self.binance_data_url.clone(),
            ..PriceApiConfig::default()
        }
    }

    pub fn http_options(&self) -> HttpServerOptions {
        HttpServerOptions {
            bind_address: self.bind_address(),
            ..HttpServerOptions::default()
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "binance-mcp-client")]
#[command(about = "Call tools on a Model Context Protocol server", version)]
pub struct ClientCli {
    /// URL of a server's HTTP endpoint, e.g. http://127.0.0.1:8000/mcp
    #[arg(long, env = "MCP_SERVER_URL", conflicts_with = "server_command")]
    pub url: Option<String>,

    /// Server executable to spawn for the stdio transport
    #[arg(long)]
    pub server_command: Option<String>,

    /// Argument passed to the spawned server; repeatable
    #[arg(long = "server-arg", allow_hyphen_values = true)]
    pub server_args: Vec<String>,

    /// Per-request timeout
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long)]
    pub quiet: bool,

    /// Tool to call; without one the server's offerings are listed
    pub tool: Option<String>,

    /// Tool arguments as key=value; values that parse as JSON are sent as JSON
    pub arguments: Vec<String>,
}

impl ClientCli {
    pub fn transport_config(&self) -> TransportConfig {
        match &self.url {
            Some(url) => TransportConfig::http(url.clone()),
            None => {
                let command = self.server_command.clone().unwrap_or_else(|| "binance-mcp-server".to_string());
                TransportConfig::process(command, self.server_args.clone())
            }
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            request_timeout: Duration::from_secs(self.timeout_secs),
            ..ClientConfig::default()
        }
    }

    /// The positional arguments as a JSON object
    pub fn tool_arguments(&self) -> Result<Value, Error> {
        let mut arguments = Map::new();
        for pair in &self.arguments {
            let (key, value) = parse_argument(pair)?;
            arguments.insert(key, value);
        }
        Ok(Value::Object(arguments))
    }
}

/// Split `key=value`; the value is JSON when it parses, a string otherwise
pub fn parse_argument(pair: &str) -> Result<(String, Value), Error> {
    let (key, raw) = pair
        .split_once('=')
        .ok_or_else(|| Error::InvalidParams(format!("Expected key=value, got {}", pair)))?;
    if key.is_empty() {
        return Err(Error::InvalidParams(format!("Missing argument name in {}", pair)));
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

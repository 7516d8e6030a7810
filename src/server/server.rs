//! Server implementation
//!
//! A [`Server`] pairs a finished registry with its configuration and serves
//! any number of sessions over any transport. It is cheap to clone; clones
//! share the same registry.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{ Map, Value };
use tracing::info;
use uuid::Uuid;

use crate::errors::Error;
use crate::registry::Registry;
use crate::transport::http_server::{ self, HttpServerHandle, HttpServerOptions };
use crate::transport::{ StdioTransport, Transport };

use super::session::ServerSession;

/// Settings shared by every session of a server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Name reported in `serverInfo`
    pub name: String,
    /// Version reported in `serverInfo`
    pub version: String,
    /// Optional instructions for the client
    pub instructions: Option<String>,
    /// Wait for `notifications/initialized` before serving feature requests
    pub require_initialized_notification: bool,
    /// Upper bound on a single tool call, if any
    pub tool_timeout: Option<Duration>,
    /// Experimental capabilities offered to clients
    pub experimental: Option<Map<String, Value>>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            instructions: None,
            require_initialized_notification: true,
            tool_timeout: None,
            experimental: None,
        }
    }
}

/// Serves a registry to clients
#[derive(Clone)]
pub struct Server {
    registry: Arc<Registry>,
    config: Arc<ServerConfig>,
}

impl Server {
    pub fn new(registry: Registry, config: ServerConfig) -> Self {
        Self {
            registry: Arc::new(registry),
            config: Arc::new(config),
        }
    }

    /// Create a new server builder
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Prepare a session on `transport` without starting it
    pub fn session(&self, transport: Arc<dyn Transport>) -> ServerSession {
        ServerSession::new(
            Uuid::new_v4().to_string(),
            transport,
            Arc::clone(&self.registry),
            Arc::clone(&self.config)
        )
    }

    /// Serve one session on `transport` until it ends
    pub async fn run_session(&self, transport: Arc<dyn Transport>) -> Result<(), Error> {
        self.session(transport).run().await
    }

    /// Serve a single session over this process's stdin and stdout
    pub async fn serve_stdio(&self) -> Result<(), Error> {
        info!("Serving {} {} on stdio", self.config.name, self.config.version);
        self.run_session(Arc::new(StdioTransport::new())).await
    }

    /// Serve the streamable HTTP endpoint; each client gets its own session
    pub async fn serve_http(&self, options: HttpServerOptions) -> Result<HttpServerHandle, Error> {
        http_server::serve(self.clone(), options).await
    }
}

/// Builder for [`Server`]
#[derive(Default)]
pub struct ServerBuilder {
    registry: Option<Registry>,
    config: ServerConfig,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.config.version = version.into();
        self
    }

    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.config.instructions = Some(instructions.into());
        self
    }

    pub fn registry(mut self, registry: Registry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn tool_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.tool_timeout = timeout;
        self
    }

    pub fn require_initialized_notification(mut self, required: bool) -> Self {
        self.config.require_initialized_notification = required;
        self
    }

    pub fn experimental(mut self, capabilities: Map<String, Value>) -> Self {
        self.config.experimental = Some(capabilities);
        self
    }

    pub fn build(self) -> Server {
        Server::new(self.registry.unwrap_or_default(), self.config)
    }
}

//! Transport module
//!
//! This module defines the Transport trait and its implementations. Stream
//! transports (stdio, child processes, in-memory pipes) share the newline
//! framing in [`framed`]; the streamable HTTP transport uses one JSON body per
//! POST plus an optional SSE stream for server-to-client traffic.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::errors::Error;
use crate::messages::Message;

pub mod channel;
pub mod framed;
pub mod http_client;
pub mod http_server;
pub mod memory;
pub mod process;
pub mod stdio;

pub use channel::{ ChannelPeer, ChannelTransport };
pub use framed::FramedTransport;
pub use http_client::{ HttpClientOptions, HttpClientTransport };
pub use http_server::{ HttpServerHandle, HttpServerOptions, SESSION_HEADER };
pub use memory::MemoryTransport;
pub use process::{ ProcessConfig, ProcessTransport };
pub use stdio::StdioTransport;

/// A bidirectional, ordered message pipe between two peers.
///
/// Methods take `&self` so that one task can block in [`receive`] while others
/// send; implementations guard their read and write halves separately.
///
/// [`receive`]: Transport::receive
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one message; frames from concurrent callers are never interleaved
    async fn send(&self, message: &Message) -> Result<(), Error>;

    /// Wait for the next message.
    ///
    /// Returns `Ok(None)` once the peer has closed the connection. A frame that
    /// cannot be decoded is reported as [`Error::MalformedMessage`] and the
    /// transport stays usable.
    async fn receive(&self) -> Result<Option<Message>, Error>;

    /// Close the connection; further sends fail and the peer observes end of stream
    async fn close(&self) -> Result<(), Error>;

    /// Whether the transport still believes the connection is open
    fn is_connected(&self) -> bool;
}

/// How a client reaches a server
#[derive(Debug, Clone)]
pub enum TransportConfig {
    /// Spawn the server as a child process and talk over its stdin/stdout
    Process(ProcessConfig),
    /// Talk to a server's streamable HTTP endpoint
    Http(HttpClientOptions),
}

impl TransportConfig {
    pub fn process(command: impl Into<String>, args: Vec<String>) -> Self {
        TransportConfig::Process(ProcessConfig {
            command: command.into(),
            args,
            env: HashMap::new(),
            shutdown_grace: Duration::from_secs(2),
        })
    }

    pub fn http(url: impl Into<String>) -> Self {
        TransportConfig::Http(HttpClientOptions::new(url))
    }

    /// Open the connection described by this configuration
    pub async fn connect(&self) -> Result<Arc<dyn Transport>, Error> {
        match self {
            TransportConfig::Process(config) => Ok(Arc::new(ProcessTransport::spawn(config)?)),
            TransportConfig::Http(options) => Ok(Arc::new(HttpClientTransport::new(options.clone())?)),
        }
    }
}

//! STDIO Transport
//!
//! Serves a single session over the current process's standard input and
//! output. Standard error stays free for logs.

use async_trait::async_trait;
use tokio::io::{ Stdin, Stdout };

use crate::errors::Error;
use crate::messages::Message;

use super::{ FramedTransport, Transport };

/// A transport implementation that uses standard input and output
pub struct StdioTransport {
    inner: FramedTransport<Stdin, Stdout>,
}

impl StdioTransport {
    pub fn new() -> Self {
        Self {
            inner: FramedTransport::new(tokio::io::stdin(), tokio::io::stdout()),
        }
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn send(&self, message: &Message) -> Result<(), Error> {
        self.inner.send(message).await
    }

    async fn receive(&self) -> Result<Option<Message>, Error> {
        self.inner.receive().await
    }

    async fn close(&self) -> Result<(), Error> {
        self.inner.close().await
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }
}

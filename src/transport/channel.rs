//! Channel-backed transport
//!
//! Connects a session to code that is not a byte stream, such as the HTTP
//! server, through a pair of mpsc queues. The peer side pushes inbound
//! messages and drains outbound ones.

use std::sync::atomic::{ AtomicBool, Ordering };

use async_trait::async_trait;
use tokio::sync::{ Mutex, mpsc };
use tokio_util::sync::CancellationToken;

use crate::errors::Error;
use crate::messages::Message;

use super::Transport;

/// Session-facing end of a channel connection
pub struct ChannelTransport {
    inbound: Mutex<mpsc::Receiver<Message>>,
    outbound: mpsc::Sender<Message>,
    closed: CancellationToken,
    connected: AtomicBool,
}

/// The other end: feeds the session and collects what it sends
pub struct ChannelPeer {
    pub inbound: mpsc::Sender<Message>,
    pub outbound: mpsc::Receiver<Message>,
}

impl ChannelTransport {
    /// Create a connected pair; cancelling `closed` ends the session's receive loop
    pub fn pair(capacity: usize, closed: CancellationToken) -> (Self, ChannelPeer) {
        let (inbound_tx, inbound_rx) = mpsc::channel(capacity);
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
        (
            Self {
                inbound: Mutex::new(inbound_rx),
                outbound: outbound_tx,
                closed,
                connected: AtomicBool::new(true),
            },
            ChannelPeer {
                inbound: inbound_tx,
                outbound: outbound_rx,
            },
        )
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, message: &Message) -> Result<(), Error> {
        if !self.is_connected() {
            return Err(Error::Transport("Transport is closed".to_string()));
        }
        self.outbound
            .send(message.clone()).await
            .map_err(|_| Error::Transport("Peer dropped the outbound channel".to_string()))
    }

    async fn receive(&self) -> Result<Option<Message>, Error> {
        let mut inbound = self.inbound.lock().await;
        let next =
            tokio::select! {
            _ = self.closed.cancelled() => None,
            message = inbound.recv() => message,
        };
        if next.is_none() {
            self.connected.store(false, Ordering::SeqCst);
        }
        Ok(next)
    }

    async fn close(&self) -> Result<(), Error> {
        self.connected.store(false, Ordering::SeqCst);
        self.closed.cancel();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && !self.closed.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::Request;

    #[tokio::test]
    async fn test_messages_flow_both_ways() {
        let (transport, mut peer) = ChannelTransport::pair(8, CancellationToken::new());

        let request = Message::Request(Request::new(5, "ping", None));
        peer.inbound.send(request.clone()).await.unwrap();
        assert_eq!(transport.receive().await.unwrap(), Some(request.clone()));

        transport.send(&request).await.unwrap();
        assert_eq!(peer.outbound.recv().await, Some(request));
    }

    #[tokio::test]
    async fn test_cancellation_ends_receive() {
        let token = CancellationToken::new();
        let (transport, _peer) = ChannelTransport::pair(8, token.clone());
        token.cancel();
        assert!(transport.receive().await.unwrap().is_none());
        assert!(!transport.is_connected());
    }
}

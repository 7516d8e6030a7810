//! Newline-framed transport over any async byte stream pair

use std::sync::atomic::{ AtomicBool, Ordering };

use async_trait::async_trait;
use futures::{ SinkExt, StreamExt };
use tokio::io::{ AsyncRead, AsyncWrite };
use tokio::sync::Mutex;
use tokio_util::codec::{ FramedRead, FramedWrite };
use tracing::{ debug, warn };

use crate::codec::MessageCodec;
use crate::errors::Error;
use crate::messages::Message;

use super::Transport;

/// Transport reading frames from `R` and writing frames to `W`
pub struct FramedTransport<R, W> {
    /// Read half; held by at most one receiver at a time
    reader: Mutex<FramedRead<R, MessageCodec>>,
    /// Write half; the lock keeps whole frames together
    writer: Mutex<FramedWrite<W, MessageCodec>>,
    /// Cleared on close or end of stream
    connected: AtomicBool,
}

impl<R, W> FramedTransport<R, W> where R: AsyncRead + Unpin + Send, W: AsyncWrite + Unpin + Send {
    pub fn new(reader: R, writer: W) -> Self {
        Self::with_codec(reader, writer, MessageCodec::new())
    }

    pub fn with_codec(reader: R, writer: W, codec: MessageCodec) -> Self {
        Self {
            reader: Mutex::new(FramedRead::new(reader, codec.clone())),
            writer: Mutex::new(FramedWrite::new(writer, codec)),
            connected: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl<R, W> Transport
    for FramedTransport<R, W>
    where R: AsyncRead + Unpin + Send, W: AsyncWrite + Unpin + Send
{
    async fn send(&self, message: &Message) -> Result<(), Error> {
        if !self.is_connected() {
            return Err(Error::Transport("Transport is closed".to_string()));
        }

        let mut writer = self.writer.lock().await;
        writer.send(message).await.map_err(|e| {
            match e {
                Error::Io(io) => {
                    self.connected.store(false, Ordering::SeqCst);
                    Error::Transport(format!("Failed to write frame: {}", io))
                }
                other => other,
            }
        })
    }

    async fn receive(&self) -> Result<Option<Message>, Error> {
        let mut reader = self.reader.lock().await;
        match reader.next().await {
            Some(Ok(Ok(message))) => Ok(Some(message)),
            Some(Ok(Err(malformed))) => {
                warn!("Received malformed frame: {}", malformed);
                Err(malformed)
            }
            Some(Err(e)) => {
                self.connected.store(false, Ordering::SeqCst);
                Err(Error::Transport(format!("Failed to read frame: {}", e)))
            }
            None => {
                debug!("Peer closed the stream");
                self.connected.store(false, Ordering::SeqCst);
                Ok(None)
            }
        }
    }

    async fn close(&self) -> Result<(), Error> {
        self.connected.store(false, Ordering::SeqCst);

        // Flush and shut down the write side so the peer sees end of stream
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.close().await {
            debug!("Error while closing write half: {}", e);
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

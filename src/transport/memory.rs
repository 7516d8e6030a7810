//! In-memory transport pair backed by `tokio::io::duplex`, used to run a client
//! and server in one process.

use tokio::io::{ DuplexStream, ReadHalf, WriteHalf };

use super::FramedTransport;

/// One end of an in-memory connection
pub type MemoryTransport = FramedTransport<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>;

const BUFFER_SIZE: usize = 64 * 1024;

/// Create two connected transports; what one sends the other receives
pub fn pair() -> (MemoryTransport, MemoryTransport) {
    let (left, right) = tokio::io::duplex(BUFFER_SIZE);
    let (left_read, left_write) = tokio::io::split(left);
    let (right_read, right_write) = tokio::io::split(right);
    (FramedTransport::new(left_read, left_write), FramedTransport::new(right_read, right_write))
}

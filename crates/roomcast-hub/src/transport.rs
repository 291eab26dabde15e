use std::sync::Arc;

use async_trait::async_trait;
use roomcast_protocol::Message;

use crate::error::ConnectionError;

/// What a single transport read yields.
#[derive(Debug)]
pub enum Frame {
    /// One decoded data message.
    Message(Message),
    /// Acknowledgment of a liveness probe.
    Pong,
    /// Orderly close from the peer.
    Closed,
}

/// Read half of a message-framed bidirectional connection.
///
/// The connection wraps every call in its read/write deadline, so
/// implementations only need to block until one frame arrives.
#[async_trait]
pub trait TransportReader: Send {
    /// Block until the next frame. Decode failures are
    /// [`ConnectionError::Decode`]; transport failures are
    /// [`ConnectionError::Transport`].
    async fn read_frame(&mut self) -> Result<Frame, ConnectionError>;
}

/// Write half of a message-framed bidirectional connection.
#[async_trait]
pub trait TransportWriter: Send {
    /// Write one data frame carrying the whole batch.
    async fn write_batch(&mut self, batch: &[Arc<Message>]) -> Result<(), ConnectionError>;

    /// Write one liveness probe (control frame, no payload).
    async fn write_ping(&mut self) -> Result<(), ConnectionError>;

    /// Close the connection. Errors are ignored by callers; this runs on
    /// every exit path.
    async fn close(&mut self);
}

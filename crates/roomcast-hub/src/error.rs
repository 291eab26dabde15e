use thiserror::Error;

/// Errors that terminate a single connection. Always fatal to that one
/// connection, never to the hub.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The underlying socket failed or was torn down by the peer.
    #[error("transport error: {0}")]
    Transport(String),

    /// An inbound frame could not be decoded as a message.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// A single read or write exceeded the configured deadline.
    #[error("read/write deadline exceeded")]
    DeadlineExceeded,

    /// The peer closed the connection in an orderly way.
    #[error("connection closed")]
    Closed,
}

/// Errors from the cross-instance backplane. Transient failures are logged
/// and the affected loop continues; a lost batch is acceptable.
#[derive(Debug, Error)]
pub enum BackplaneError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("batch decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// The subscription is gone and will not recover.
    #[error("backplane closed")]
    Closed,
}

/// The hub's queues are gone; it has been shut down.
#[derive(Debug, Error)]
#[error("hub is shut down")]
pub struct HubClosed;

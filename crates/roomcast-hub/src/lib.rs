pub mod backplane;
pub mod connection;
pub mod error;
pub mod hub;
mod presence;
#[cfg(test)]
pub(crate) mod testutil;
pub mod transport;

pub use backplane::{Backplane, LoopbackBackplane, RedisBackplane};
pub use connection::{ClientHandle, Connection, ConnectionId};
pub use error::{BackplaneError, ConnectionError, HubClosed};
pub use hub::Hub;
pub use transport::{Frame, TransportReader, TransportWriter};

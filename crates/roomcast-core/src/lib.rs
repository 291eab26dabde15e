pub mod config;
pub mod error;

pub use config::RoomcastConfig;
pub use error::{Result, RoomcastError};

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

// Connection tunables. A probe is sent once a connection has been silent for
// MIN_PING_SECS; a connection silent past MAX_PING_SECS is considered dead.
pub const DEFAULT_RW_DEADLINE_SECS: u64 = 600; // bound on any single read/write
pub const DEFAULT_MIN_PING_SECS: u64 = 10;
pub const DEFAULT_MAX_PING_SECS: u64 = 30;
pub const DEFAULT_OUTBOUND_QUEUE: usize = 126;
pub const DEFAULT_MAX_PER_FLUSH: usize = 30;
pub const DEFAULT_FLUSH_MS: u64 = 20;

// Hub tunables. The fan-out worker pool is 3x the broadcast queue capacity.
pub const DEFAULT_HUB_QUEUE: usize = 20;
pub const DEFAULT_MAX_PUB_PER_FLUSH: usize = 20;
pub const DEFAULT_PUB_FLUSH_MS: u64 = 10;
pub const DEFAULT_PRESENCE_INTERVAL_SECS: u64 = 1;

pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 9998;

/// Top-level config (roomcast.toml + ROOMCAST_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RoomcastConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub hub: HubConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub connection: ConnectionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory served at `/` for the demo UI.
    #[serde(default = "default_static_dir")]
    pub static_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Instance name, used as the presence-map field for this process.
    #[serde(default = "default_name")]
    pub name: String,
    /// Backplane pub/sub channel shared by all instances of one room.
    #[serde(default = "default_name")]
    pub channel: String,
    /// Standalone mode: no Redis, publish loops straight back to broadcast.
    #[serde(default = "bool_true")]
    pub standalone: bool,
    #[serde(default = "default_hub_queue")]
    pub queue_size: usize,
    #[serde(default = "default_max_pub_per_flush")]
    pub max_pub_per_flush: usize,
    #[serde(default = "default_pub_flush_ms")]
    pub pub_flush_ms: u64,
    #[serde(default = "default_presence_interval_secs")]
    pub presence_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_rw_deadline_secs")]
    pub rw_deadline_secs: u64,
    #[serde(default = "default_min_ping_secs")]
    pub min_ping_secs: u64,
    #[serde(default = "default_max_ping_secs")]
    pub max_ping_secs: u64,
    #[serde(default = "default_outbound_queue")]
    pub queue_size: usize,
    #[serde(default = "default_max_per_flush")]
    pub max_per_flush: usize,
    #[serde(default = "default_flush_ms")]
    pub flush_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            static_dir: default_static_dir(),
        }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            channel: default_name(),
            standalone: true,
            queue_size: default_hub_queue(),
            max_pub_per_flush: default_max_pub_per_flush(),
            pub_flush_ms: default_pub_flush_ms(),
            presence_interval_secs: default_presence_interval_secs(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            rw_deadline_secs: default_rw_deadline_secs(),
            min_ping_secs: default_min_ping_secs(),
            max_ping_secs: default_max_ping_secs(),
            queue_size: default_outbound_queue(),
            max_per_flush: default_max_per_flush(),
            flush_ms: default_flush_ms(),
        }
    }
}

impl RoomcastConfig {
    /// Load config from a TOML file with ROOMCAST_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ./roomcast.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path.unwrap_or("roomcast.toml");

        let config: RoomcastConfig = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("ROOMCAST_").split("_"))
            .extract()
            .map_err(|e| crate::error::RoomcastError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_static_dir() -> String {
    "./views".to_string()
}

fn default_name() -> String {
    "default".to_string()
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_hub_queue() -> usize {
    DEFAULT_HUB_QUEUE
}

fn default_max_pub_per_flush() -> usize {
    DEFAULT_MAX_PUB_PER_FLUSH
}

fn default_pub_flush_ms() -> u64 {
    DEFAULT_PUB_FLUSH_MS
}

fn default_presence_interval_secs() -> u64 {
    DEFAULT_PRESENCE_INTERVAL_SECS
}

fn default_rw_deadline_secs() -> u64 {
    DEFAULT_RW_DEADLINE_SECS
}

fn default_min_ping_secs() -> u64 {
    DEFAULT_MIN_PING_SECS
}

fn default_max_ping_secs() -> u64 {
    DEFAULT_MAX_PING_SECS
}

fn default_outbound_queue() -> usize {
    DEFAULT_OUTBOUND_QUEUE
}

fn default_max_per_flush() -> usize {
    DEFAULT_MAX_PER_FLUSH
}

fn default_flush_ms() -> u64 {
    DEFAULT_FLUSH_MS
}

fn bool_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_tunables() {
        let cfg = RoomcastConfig::default();
        assert_eq!(cfg.connection.rw_deadline_secs, 600);
        assert_eq!(cfg.connection.min_ping_secs, 10);
        assert_eq!(cfg.connection.max_ping_secs, 30);
        assert_eq!(cfg.connection.queue_size, 126);
        assert_eq!(cfg.connection.max_per_flush, 30);
        assert_eq!(cfg.hub.queue_size, 20);
        assert_eq!(cfg.hub.max_pub_per_flush, 20);
        assert!(cfg.hub.standalone);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = RoomcastConfig::load(Some("/nonexistent/roomcast.toml")).unwrap();
        assert_eq!(cfg.hub.name, "default");
        assert_eq!(cfg.server.port, 9998);
    }
}

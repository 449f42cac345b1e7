//! Server configuration

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::protocol::TopicMode;
use crate::registry::{DeliveryMode, RegistryBackend, RegistryConfig};

/// Port used when neither `WEBSOCKET_PORT` nor `CANVAS_BIND_ADDR` is set
pub const DEFAULT_PORT: u16 = 8080;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,

    /// WebSocket upgrade must complete within this time
    pub handshake_timeout: Duration,

    /// How the request path maps to a topic
    pub topic_mode: TopicMode,

    /// Registry implementation
    pub backend: RegistryBackend,

    /// Interval between hub stats log lines (None = disabled)
    pub stats_interval: Option<Duration>,

    /// Registry options
    pub registry: RegistryConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            tcp_nodelay: true, // Coordinates are tiny and latency bound
            handshake_timeout: Duration::from_secs(10),
            topic_mode: TopicMode::default(),
            backend: RegistryBackend::default(),
            stats_interval: Some(Duration::from_secs(30)),
            registry: RegistryConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Build a config from the process environment
    ///
    /// | Variable                  | Values                |
    /// |---------------------------|-----------------------|
    /// | `WEBSOCKET_PORT`          | port number           |
    /// | `CANVAS_BIND_ADDR`        | `ip:port`, wins over the port |
    /// | `CANVAS_REGISTRY_BACKEND` | `locked`, `sharded`   |
    /// | `CANVAS_DELIVERY`         | `blocking`, `drop`    |
    /// | `CANVAS_RECYCLE_IDS`      | `true`, `false`       |
    /// | `CANVAS_MAILBOX_CAPACITY` | positive integer      |
    /// | `CANVAS_TOPIC_MODE`       | `path`, `room`        |
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(port) = lookup("WEBSOCKET_PORT") {
            config.bind_addr.set_port(parse_var("WEBSOCKET_PORT", &port)?);
        }

        if let Some(addr) = lookup("CANVAS_BIND_ADDR") {
            config.bind_addr = parse_var("CANVAS_BIND_ADDR", &addr)?;
        }

        if let Some(backend) = lookup("CANVAS_REGISTRY_BACKEND") {
            config.backend = match backend.trim().to_ascii_lowercase().as_str() {
                "locked" => RegistryBackend::Locked,
                "sharded" => RegistryBackend::Sharded,
                other => return Err(invalid("CANVAS_REGISTRY_BACKEND", other)),
            };
        }

        if let Some(delivery) = lookup("CANVAS_DELIVERY") {
            let mode = match delivery.trim().to_ascii_lowercase().as_str() {
                "blocking" => DeliveryMode::Blocking,
                "drop" => DeliveryMode::DropWhenFull,
                other => return Err(invalid("CANVAS_DELIVERY", other)),
            };
            config.registry = config.registry.delivery_mode(mode);
        }

        if let Some(recycle) = lookup("CANVAS_RECYCLE_IDS") {
            config.registry = config
                .registry
                .recycle_ids(parse_var("CANVAS_RECYCLE_IDS", &recycle)?);
        }

        if let Some(capacity) = lookup("CANVAS_MAILBOX_CAPACITY") {
            let capacity: usize = parse_var("CANVAS_MAILBOX_CAPACITY", &capacity)?;
            if capacity == 0 {
                return Err(invalid("CANVAS_MAILBOX_CAPACITY", "0"));
            }
            config.registry = config.registry.mailbox_capacity(capacity);
        }

        if let Some(mode) = lookup("CANVAS_TOPIC_MODE") {
            config.topic_mode = match mode.trim().to_ascii_lowercase().as_str() {
                "path" => TopicMode::FullPath,
                "room" => TopicMode::RoomOnly,
                other => return Err(invalid("CANVAS_TOPIC_MODE", other)),
            };
        }

        Ok(config)
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the bind IP, keeping the port
    pub fn bind_ip(mut self, ip: IpAddr) -> Self {
        self.bind_addr.set_ip(ip);
        self
    }

    /// Enable or disable TCP_NODELAY
    pub fn tcp_nodelay(mut self, enabled: bool) -> Self {
        self.tcp_nodelay = enabled;
        self
    }

    /// Set handshake timeout
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set how request paths map to topics
    pub fn topic_mode(mut self, mode: TopicMode) -> Self {
        self.topic_mode = mode;
        self
    }

    /// Select the registry backend
    pub fn backend(mut self, backend: RegistryBackend) -> Self {
        self.backend = backend;
        self
    }

    /// Log hub stats every `interval`
    pub fn stats_interval(mut self, interval: Duration) -> Self {
        self.stats_interval = Some(interval);
        self
    }

    /// Disable periodic stats logging
    pub fn disable_stats(mut self) -> Self {
        self.stats_interval = None;
        self
    }

    /// Set registry options
    pub fn registry(mut self, registry: RegistryConfig) -> Self {
        self.registry = registry;
        self
    }
}

fn parse_var<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("{}={:?}: {}", key, value, e)))
}

fn invalid(key: &str, value: &str) -> Error {
    Error::Config(format!("{}={:?}: unsupported value", key, value))
}

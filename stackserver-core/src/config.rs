//! Server configuration.
//!
//! The core needs four values before it can accept connections: the
//! connection limit, the stack capacity, the eviction age and the bind
//! target. Everything else here tunes the process around it.
//!
//! # Environment Variables
//!
//! | Variable | Default |
//! |----------|---------|
//! | `STACKSERVER_HOST` | `127.0.0.1` |
//! | `STACKSERVER_PORT` | `8080` |
//! | `STACKSERVER_MAX_CONNECTIONS` | `100` |
//! | `STACKSERVER_STACK_SIZE` | `100` |
//! | `STACKSERVER_MAX_AGE_SECS` | `10` |
//! | `STACKSERVER_DRAIN_TIMEOUT_SECS` | `5` |
//! | `STACKSERVER_TCP_NODELAY` | `true` |
//! | `STACKSERVER_TCP_KEEPALIVE_SECS` | `60` (`0` disables) |

use std::time::Duration;

use tracing::warn;

use crate::error::ConfigError;

/// Default bind host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default TCP port.
pub const DEFAULT_PORT: u16 = 8080;

/// Runtime configuration for a StackServer instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Interface to bind. Empty means all interfaces.
    pub host: String,

    /// TCP port to listen on. `0` picks an ephemeral port.
    pub port: u16,

    /// Maximum number of registered connections.
    pub max_connections: usize,

    /// Maximum number of payloads held by the stack.
    pub stack_capacity: usize,

    /// Age past which the oldest connection may be evicted to admit a new one.
    pub max_connection_age: Duration,

    /// How long shutdown waits for in-flight connections.
    pub drain_timeout: Duration,

    /// Disable Nagle's algorithm on accepted sockets.
    pub tcp_nodelay: bool,

    /// TCP keepalive idle time in seconds. Lets a peer that vanished without
    /// a FIN surface to the disconnect watchdog. `0` disables keepalive.
    pub tcp_keepalive_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_connections: 100,
            stack_capacity: 100,
            max_connection_age: Duration::from_secs(10),
            drain_timeout: Duration::from_secs(5),
            tcp_nodelay: true,
            tcp_keepalive_secs: 60,
        }
    }
}

impl ServerConfig {
    /// Load configuration from `STACKSERVER_*` environment variables,
    /// falling back to defaults. Invalid values are logged and ignored.
    #[must_use]
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            host: std::env::var("STACKSERVER_HOST").unwrap_or(default.host),
            port: parse_env_warn("STACKSERVER_PORT", default.port),
            max_connections: parse_env_warn(
                "STACKSERVER_MAX_CONNECTIONS",
                default.max_connections,
            ),
            stack_capacity: parse_env_warn("STACKSERVER_STACK_SIZE", default.stack_capacity),
            max_connection_age: Duration::from_secs(parse_env_warn(
                "STACKSERVER_MAX_AGE_SECS",
                default.max_connection_age.as_secs(),
            )),
            drain_timeout: Duration::from_secs(parse_env_warn(
                "STACKSERVER_DRAIN_TIMEOUT_SECS",
                default.drain_timeout.as_secs(),
            )),
            tcp_nodelay: parse_env_warn("STACKSERVER_TCP_NODELAY", default.tcp_nodelay),
            tcp_keepalive_secs: parse_env_warn(
                "STACKSERVER_TCP_KEEPALIVE_SECS",
                default.tcp_keepalive_secs,
            ),
        }
    }

    /// Check the values the core cannot run without.
    ///
    /// # Errors
    ///
    /// [`ConfigError::ZeroConnections`] or [`ConfigError::ZeroCapacity`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections == 0 {
            return Err(ConfigError::ZeroConnections);
        }
        if self.stack_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(())
    }

    /// `host:port` string handed to the listener. An empty host binds all
    /// interfaces.
    #[must_use]
    pub fn bind_target(&self) -> String {
        let host = if self.host.is_empty() {
            "0.0.0.0"
        } else {
            self.host.as_str()
        };
        format!("{}:{}", host, self.port)
    }
}

/// Parse an environment variable with a warning on invalid values.
///
/// If the env var is set but cannot be parsed, logs a warning and returns the default.
/// If the env var is not set, returns the default silently.
fn parse_env_warn<T: std::str::FromStr + std::fmt::Display>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(val) => match val.parse::<T>() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!(
                    env_var = name,
                    value = %val,
                    default = %default,
                    "Invalid value for environment variable, using default"
                );
                default
            }
        },
        Err(_) => default,
    }
}

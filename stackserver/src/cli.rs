//! Command-line interface.

use std::time::Duration;

use clap::Parser;
use stackserver_core::ServerConfig;
use stackserver_core::config::{DEFAULT_HOST, DEFAULT_PORT};

/// Single-request TCP server for a shared, bounded LIFO byte store.
///
/// Limits not given on the command line fall back to `STACKSERVER_*`
/// environment variables, then to built-in defaults.
#[derive(Parser, Debug, Clone)]
#[command(name = "stackserver", author, version, about, long_about = None)]
pub struct Cli {
    /// Hostname or IP of the interface to bind. Empty listens on all interfaces.
    #[arg(long, env = "STACKSERVER_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// TCP port to listen on
    #[arg(long, env = "STACKSERVER_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Host receiving UDP diagnostic datagrams
    #[arg(long, env = "STACKSERVER_DEBUG_HOST", default_value = "127.0.0.1")]
    pub debughost: String,

    /// Port receiving UDP diagnostic datagrams. 0 disables them.
    #[arg(long, env = "STACKSERVER_DEBUG_PORT", default_value_t = 0)]
    pub debugport: u16,

    /// Maximum number of registered connections
    #[arg(long)]
    pub max_connections: Option<usize>,

    /// Maximum number of payloads on the stack
    #[arg(long)]
    pub stack_size: Option<usize>,

    /// Seconds after which the oldest connection may be evicted
    #[arg(long)]
    pub max_age_secs: Option<u64>,
}

impl Cli {
    /// Merge the flags over the environment-derived configuration.
    #[must_use]
    pub fn server_config(&self) -> ServerConfig {
        let mut config = ServerConfig::from_env();
        config.host = self.host.clone();
        config.port = self.port;
        if let Some(max) = self.max_connections {
            config.max_connections = max;
        }
        if let Some(size) = self.stack_size {
            config.stack_capacity = size;
        }
        if let Some(secs) = self.max_age_secs {
            config.max_connection_age = Duration::from_secs(secs);
        }
        config
    }
}

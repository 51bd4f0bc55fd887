//! Error types for the StackServer process layer.

use std::io;

use stackserver_core::{ConfigError, CoordinatorError, ProtocolError};
use thiserror::Error;

/// Errors that stop the server from starting or running.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Listener could not bind its address
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Other I/O failure on the listener
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type alias for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that end a single connection without a reply.
///
/// These never reach the client. They are logged and the socket is closed.
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// Peer sent a request that could not be completed
    #[error("Protocol violation: {0}")]
    Protocol(#[from] ProtocolError),

    /// Coordinator failed for a reason other than cancellation
    #[error("Coordinator error: {0}")]
    Coordinator(#[from] CoordinatorError),

    /// Writing the reply failed
    #[error("Reply write failed: {0}")]
    Io(#[from] io::Error),
}

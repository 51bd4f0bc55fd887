//! Error types for the StackServer core.
//!
//! Every failure here is scoped to a single connection. None of these errors
//! is ever written to a client; the wire protocol only knows the busy byte
//! (admission rejected) and "close without reply".

use thiserror::Error;

/// Errors raised by the connection registry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Registry is full and its oldest entry is still younger than the
    /// eviction threshold. The caller replies busy and closes the socket.
    #[error("connection limit of {max} reached and no connection is old enough to evict")]
    AdmissionRejected {
        /// The configured maximum number of live connections.
        max: usize,
    },

    /// A linked connector was released while the live count was already zero.
    ///
    /// Internal invariant violation; surfaced to operators only.
    #[error("registry underflow: release with zero live connections")]
    RegistryUnderflow,
}

/// Errors raised by the non-blocking bounded stack.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StackError {
    /// Push attempted while depth equals capacity.
    #[error("stack is full (capacity {capacity})")]
    Full {
        /// Configured stack capacity.
        capacity: usize,
    },

    /// Pop attempted on an empty stack.
    #[error("stack is empty")]
    Empty,
}

/// Errors raised by the blocking coordinator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    /// The caller's cancellation signal fired before a slot could be claimed.
    /// The stack was not touched.
    #[error("operation canceled")]
    Canceled,

    /// The occupancy channel was closed. Only possible if the coordinator is
    /// torn down while a waiter is still parked on it.
    #[error("coordinator closed")]
    Closed,

    /// The stack refused a mutation the occupancy counter had just admitted.
    ///
    /// This means occupancy and depth diverged, which the coordinator is
    /// built to make impossible.
    #[error("occupancy counter out of sync with stack: {0}")]
    Desync(#[source] StackError),
}

/// Errors raised when building a [`Payload`](crate::payload::Payload).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PayloadError {
    /// Payload exceeds the 7-bit length field of the wire header.
    #[error("payload of {len} bytes exceeds maximum of {max}")]
    TooLarge {
        /// Offered length.
        len: usize,
        /// Maximum encodable length.
        max: usize,
    },
}

/// Errors raised while decoding a request off a socket.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The peer closed before the declared request was complete.
    #[error("connection closed after {received} of {expected} request bytes")]
    UnexpectedEof {
        /// Total request length implied by the header (header byte included).
        expected: usize,
        /// Bytes received before end-of-stream.
        received: usize,
    },

    /// I/O error while reading the request.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by configuration validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// `max_connections` must admit at least one connection.
    #[error("max_connections must be greater than zero")]
    ZeroConnections,

    /// `stack_capacity` must hold at least one payload.
    #[error("stack_capacity must be greater than zero")]
    ZeroCapacity,
}

//! StackServer Core — shared state for the single-request LIFO server.
//!
//! This crate holds everything the connection tasks share:
//!
//! - [`registry::Registry`]: bounded, admission-ordered set of live
//!   connections with age-based eviction of the oldest entry.
//! - [`stack::BoundedStack`]: non-blocking LIFO store with fixed capacity.
//! - [`coordinator::Coordinator`]: blocking push/pop over the stack, gated by
//!   an occupancy counter and interruptible per caller.
//! - [`protocol`]: the one-byte-header request codec and reply constants.
//! - [`config::ServerConfig`]: limits, bind target and tuning.
//!
//! Socket handling, the accept loop and process setup live in the
//! `stackserver` crate.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod payload;
pub mod protocol;
pub mod registry;
pub mod stack;

pub use config::ServerConfig;
pub use coordinator::Coordinator;
pub use error::{
    ConfigError, CoordinatorError, PayloadError, ProtocolError, RegistryError, StackError,
};
pub use payload::{MAX_PAYLOAD_LEN, Payload};
pub use protocol::{Opcode, Request};
pub use registry::{ConnectionId, Connector, Registry, Released, SocketHandle};
pub use stack::BoundedStack;

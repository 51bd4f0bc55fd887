//! StackServer process layer.
//!
//! Wraps the core registry and coordinator in a TCP listener: admission,
//! per-connection tasks, logging setup and graceful shutdown. The binary in
//! `main.rs` is a thin shell over [`StackServer`].

pub mod cli;
pub mod connection;
pub mod diagnostics;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod server;

pub use error::{ConnectionError, ServerError, ServerResult};
pub use lifecycle::DrainResult;
pub use server::{BoundServer, StackServer};

//! # Server Module
//!
//! Acceptor threads and the TCP transport.
//!
//! [`Server`] runs one or more acceptors against any
//! [`Input`](crate::channel::Input); [`tcp`] provides the `tiny_http` backed
//! input and output used by the binary. Tests use the in-memory transport from
//! [`channel::memory`](crate::channel::memory) instead.
//!
//! Shutdown order: the input is shut down first so acceptors exit, then the
//! dispatcher drains (graceful) or halts (forceful) the pipeline.

mod core;
pub mod tcp;

pub use self::core::{Server, ServerHandle};
pub use tcp::{TcpInput, TcpOutput};

//! # Channel Module
//!
//! Protocol-neutral notions of where requests come from and where replies go.
//!
//! - [`Protocol`] tags the transport/method variant of a request.
//! - [`Input`] yields `(Request, Output)` pairs; it is the only entry point
//!   for new work.
//! - [`Output`] is the reply target of one request, with four reply modes
//!   and an idempotent close.
//! - [`ChannelGuard`] owns an output and closes it on drop, which is how the
//!   core guarantees that every channel is released exactly once.
//!
//! The [`memory`] submodule provides an in-process implementation. The TCP
//! transport lives in [`crate::server`].

mod core;
pub mod memory;

pub use self::core::{ChannelGuard, Incoming, Input, Output, Protocol};

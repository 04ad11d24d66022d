//! # Router Module
//!
//! Maps raw request paths to registered handlers.
//!
//! ## Overview
//!
//! A [`Registry`] binds path prefixes to handlers and always carries a
//! default entry. A [`CommandRouter`] resolves a path to the most specific
//! registered ancestor, segment by segment:
//!
//! ```text
//! registry: { <default>, "/", "/foo", "/foo/bar", "/bar", "bar" }
//!
//! /foo/bar/baz  ->  /foo/bar
//! /foo/baz      ->  /foo
//! /bar//foo/    ->  /bar        (empty segments are ignored)
//! /baz          ->  /
//! bar/foo       ->  bar         (undelimited input keeps its style)
//! fudge         ->  <default>
//! ```
//!
//! ## Example
//!
//! ```rust
//! use brrtdispatch::dispatcher::handler_fn;
//! use brrtdispatch::message::{EventResult, Response};
//! use brrtdispatch::router::{CommandKey, CommandRouter, Registry};
//!
//! let registry = Registry::builder()
//!     .default_handler(handler_fn("missing", |_| Ok(EventResult::from(Response::not_found()))))
//!     .route("/pets", handler_fn("pets", |_| Ok(EventResult::from(Response::not_found()))))
//!     .build()
//!     .expect("registry has a default");
//! let router = CommandRouter::new(registry);
//!
//! assert_eq!(router.identify_command(Some("/pets/42")), CommandKey::prefix("/pets"));
//! ```
//!
//! ## Performance
//!
//! Resolutions are memoized per raw path in a `DashMap`, so steady-state
//! lookups are a single concurrent hash probe. The cache is never evicted;
//! it is bounded by the number of distinct paths clients send.

mod core;
mod registry;
#[cfg(test)]
mod tests;

pub use self::core::{CommandRouter, MAX_INLINE_SEGMENTS};
pub use registry::{CommandKey, Registry, RegistryBuilder};

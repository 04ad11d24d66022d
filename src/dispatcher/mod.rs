//! # Dispatcher Module
//!
//! Glue between an [`Input`](crate::channel::Input) and the worker threads.
//!
//! ## Overview
//!
//! For every inbound `(Request, Output)` pair the dispatcher:
//!
//! 1. wraps the output in a [`ChannelGuard`](crate::channel::ChannelGuard),
//! 2. resolves the handler through the [`CommandRouter`](crate::router::CommandRouter),
//! 3. publishes a [`DispatchEvent`] into the ring, blocking while it is full.
//!
//! A worker of the `dispatch` group then runs the handler and passes the
//! result with the channel to the [`ResultListener`](crate::listener::ResultListener).
//!
//! ```text
//! acceptor ─dispatch─► router ─► ring ─► DispatchConsumer ─► handler
//!                                               └─► listener ─► Output::send_* + close
//! ```
//!
//! ## Failure Handling
//!
//! A handler returning `Err` or panicking yields
//! [`EventResult::Failed`](crate::message::EventResult::Failed); the worker
//! keeps running and the client gets a JSON error list.
//!
//! ## Example
//!
//! ```rust
//! use brrtdispatch::channel::{memory::MemoryOutput, Protocol};
//! use brrtdispatch::config::PipelineConfig;
//! use brrtdispatch::dispatcher::{handler_fn, Dispatcher};
//! use brrtdispatch::listener::{ReplyListener, ResultListener};
//! use brrtdispatch::message::{DataType, RequestBuilder, Response};
//! use brrtdispatch::pipeline::ShutdownMode;
//! use brrtdispatch::router::Registry;
//! use std::sync::Arc;
//!
//! let registry = Registry::builder()
//!     .default_handler(handler_fn("hello", |_| {
//!         Ok(Response::ok(DataType::Json).with_body("\"hello\"").into())
//!     }))
//!     .build()?;
//! let listener: Arc<dyn ResultListener> = Arc::new(ReplyListener::new());
//! let dispatcher = Dispatcher::new(registry, &PipelineConfig::default(), Some(listener))?;
//!
//! let (output, probe) = MemoryOutput::new();
//! dispatcher.dispatch(RequestBuilder::new(Protocol::Get).build(), Box::new(output))?;
//! dispatcher.shutdown(ShutdownMode::Graceful);
//! assert_eq!(probe.replies()[0].body, "\"hello\"");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod core;
mod handler;

pub use self::core::{DispatchConsumer, DispatchEvent, Dispatcher, EventWrapper, DISPATCH_GROUP};
pub use handler::{handler_fn, EventHandler, FnHandler};

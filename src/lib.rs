//! # brrtdispatch
//!
//! Request-dispatch core for embeddable API servers.
//!
//! ## Overview
//!
//! A request arrives on an [`Input`](channel::Input) paired with the
//! [`Output`](channel::Output) its reply must go to. An acceptor resolves the
//! handler by longest path prefix, publishes the request into a preallocated
//! event ring and returns to accepting. Worker threads drain the ring, run the
//! handler and hand the result to a [`ResultListener`](listener::ResultListener),
//! which writes exactly one reply and always closes the channel.
//!
//! ```text
//! Input --> acceptor --> CommandRouter --> Pipeline ring --> worker
//!                                                              |
//!                         Output <-- ResultListener <-- EventHandler
//! ```
//!
//! ## Modules
//!
//! - **[`channel`]** - input/output seams, the closing guard and the in-memory transport
//! - **[`message`]** - request, response and event result model
//! - **[`router`]** - handler registry and cached longest-prefix resolution
//! - **[`pipeline`]** - bounded multi-group event ring with worker threads
//! - **[`dispatcher`]** - handler trait and the route-publish-run glue
//! - **[`listener`]** - result delivery
//! - **[`server`]** - acceptor threads and the TCP transport
//! - **[`handlers`]** - standard leaf handlers (`/version`, `/login`, not found)
//! - **[`datastore`]** - table storage for handlers
//! - **[`config`]**, **[`observability`]**, **[`cli`]** - the binary's plumbing
//!
//! ## Quick Start
//!
//! ```rust
//! use brrtdispatch::channel::memory::memory_channel;
//! use brrtdispatch::channel::{Input, Protocol};
//! use brrtdispatch::config::PipelineConfig;
//! use brrtdispatch::dispatcher::{handler_fn, Dispatcher};
//! use brrtdispatch::listener::{ReplyListener, ResultListener};
//! use brrtdispatch::message::{DataType, RequestBuilder, Response};
//! use brrtdispatch::router::Registry;
//! use brrtdispatch::server::Server;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let registry = Registry::builder()
//!     .default_handler(handler_fn("missing", |_| Ok(Response::not_found().with_body("[]").into())))
//!     .route("/hello", handler_fn("hello", |_| {
//!         Ok(Response::ok(DataType::Json).with_body(r#""hi""#).into())
//!     }))
//!     .build()?;
//!
//! let listener: Arc<dyn ResultListener> = Arc::new(ReplyListener::new());
//! let dispatcher = Arc::new(Dispatcher::new(registry, &PipelineConfig::default(), Some(listener))?);
//!
//! let (connector, input) = memory_channel();
//! let input: Arc<dyn Input> = Arc::new(input);
//! let handle = Server::new(input, dispatcher, 1).start()?;
//!
//! let probe = connector.submit(RequestBuilder::new(Protocol::Get).command_line("/hello/world").build())?;
//! assert!(probe.wait_closed(Duration::from_secs(5)));
//! assert_eq!(probe.replies()[0].body, r#""hi""#);
//!
//! handle.stop(brrtdispatch::pipeline::ShutdownMode::Graceful);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod channel;
pub mod cli;
pub mod config;
pub mod datastore;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod ids;
pub mod listener;
pub mod message;
pub mod observability;
pub mod pipeline;
pub mod router;
pub mod server;

pub use dispatcher::{Dispatcher, EventHandler};
pub use error::DispatchError;
pub use ids::RequestId;
pub use listener::{ReplyListener, ResultListener};
pub use message::{EventResult, Request, Response};
pub use router::{CommandRouter, Registry};

use crate::message::{EventResult, Request};
use std::fmt;

/// Business logic bound to a registry entry.
///
/// Handlers run on pipeline worker threads and may be shared by any number
/// of them at once, so they take `&self`. Returning `Err` (or panicking)
/// produces an error body for the client; it never takes the worker down.
pub trait EventHandler: Send + Sync {
    fn handle(&self, request: &Request) -> anyhow::Result<EventResult>;

    /// Name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// [`EventHandler`] backed by a closure. Built with [`handler_fn`].
pub struct FnHandler<F> {
    name: &'static str,
    f: F,
}

/// Wrap a closure as a named handler.
///
/// ```rust
/// use brrtdispatch::dispatcher::{handler_fn, EventHandler};
/// use brrtdispatch::message::{DataType, EventResult, Response};
///
/// let ping = handler_fn("ping", |_req| {
///     Ok(EventResult::from(Response::ok(DataType::Json).with_body("\"pong\"")))
/// });
/// assert_eq!(ping.name(), "ping");
/// ```
pub fn handler_fn<F>(name: &'static str, f: F) -> FnHandler<F>
where
    F: Fn(&Request) -> anyhow::Result<EventResult> + Send + Sync,
{
    FnHandler { name, f }
}

impl<F> EventHandler for FnHandler<F>
where
    F: Fn(&Request) -> anyhow::Result<EventResult> + Send + Sync,
{
    fn handle(&self, request: &Request) -> anyhow::Result<EventResult> {
        (self.f)(request)
    }

    fn name(&self) -> &str {
        self.name
    }
}

impl<F> fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler").field("name", &self.name).finish()
    }
}

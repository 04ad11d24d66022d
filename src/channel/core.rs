use crate::error::MappingError;
use crate::message::{Request, Response};
use http::Method;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::str::FromStr;
use tracing::{debug, warn};

/// Transport/method variant an inbound request arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl Protocol {
    /// The HTTP method this protocol tag stands for.
    #[must_use]
    pub fn method(self) -> Method {
        match self {
            Protocol::Get => Method::GET,
            Protocol::Post => Method::POST,
            Protocol::Put => Method::PUT,
            Protocol::Delete => Method::DELETE,
            Protocol::Patch => Method::PATCH,
            Protocol::Head => Method::HEAD,
            Protocol::Options => Method::OPTIONS,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Get => "GET",
            Protocol::Post => "POST",
            Protocol::Put => "PUT",
            Protocol::Delete => "DELETE",
            Protocol::Patch => "PATCH",
            Protocol::Head => "HEAD",
            Protocol::Options => "OPTIONS",
        }
    }
}

impl TryFrom<&Method> for Protocol {
    type Error = MappingError;

    fn try_from(method: &Method) -> Result<Self, Self::Error> {
        method.as_str().parse()
    }
}

impl FromStr for Protocol {
    type Err = MappingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GET" => Ok(Protocol::Get),
            "POST" => Ok(Protocol::Post),
            "PUT" => Ok(Protocol::Put),
            "DELETE" => Ok(Protocol::Delete),
            "PATCH" => Ok(Protocol::Patch),
            "HEAD" => Ok(Protocol::Head),
            "OPTIONS" => Ok(Protocol::Options),
            other => Err(MappingError::Protocol(other.to_string())),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reply target for exactly one request.
///
/// An `Output` owns the underlying connection for the lifetime of its
/// request. Implementations must make [`close`](Output::close) idempotent;
/// the dispatch core wraps every output in a [`ChannelGuard`] so that close
/// is called once on every exit path.
pub trait Output: Send {
    /// Write a successful reply.
    fn send_ok(&mut self, response: &Response) -> io::Result<()>;

    /// Write a redirect; the response body is the target location.
    fn send_redirect(&mut self, response: &Response) -> io::Result<()>;

    /// Write a use-proxy reply; the response body is the proxy location.
    fn send_proxy(&mut self, response: &Response) -> io::Result<()>;

    /// Write a not-found reply.
    fn send_not_found(&mut self, response: &Response) -> io::Result<()>;

    /// Release the underlying resource. Calling this more than once is a no-op.
    fn close(&mut self);

    fn is_closed(&self) -> bool;
}

/// Source of inbound work.
///
/// `wait_for_incoming_request` is the only way requests enter the pipeline.
pub trait Input: Send + Sync {
    /// Block until the next request arrives.
    ///
    /// Returns `Ok(None)` once the input has been shut down. Transient
    /// per-connection failures are handled inside the implementation; an
    /// `Err` means the input itself is broken.
    fn wait_for_incoming_request(&self) -> io::Result<Option<Incoming>>;

    /// Stop producing requests and wake every blocked caller.
    fn shutdown(&self);

    /// Human readable description for logs, e.g. the bound address.
    fn describe(&self) -> String {
        "input".to_string()
    }
}

/// A request paired with the channel its reply must go to.
pub type Incoming = (Request, Box<dyn Output>);

/// Owns an [`Output`] and closes it when dropped.
///
/// Dropping happens on normal return, on early return and while unwinding
/// from a panic, so a guarded channel can never be left open.
pub struct ChannelGuard {
    output: Option<Box<dyn Output>>,
}

impl ChannelGuard {
    #[must_use]
    pub fn new(output: Box<dyn Output>) -> Self {
        Self {
            output: Some(output),
        }
    }

    /// Access the guarded output. `None` only after [`close`](Self::close).
    pub fn output(&mut self) -> Option<&mut (dyn Output + 'static)> {
        self.output.as_deref_mut()
    }

    /// Close now instead of waiting for drop.
    pub fn close(&mut self) {
        if let Some(mut output) = self.output.take() {
            if output.is_closed() {
                warn!("Channel already closed before guard release");
            }
            output.close();
            debug!("Channel closed");
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.output.as_ref().is_none_or(|o| o.is_closed())
    }
}

impl Drop for ChannelGuard {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for ChannelGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelGuard")
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::memory::MemoryOutput;

    #[test]
    fn test_protocol_round_trips_through_method() {
        for p in [
            Protocol::Get,
            Protocol::Post,
            Protocol::Put,
            Protocol::Delete,
            Protocol::Patch,
            Protocol::Head,
            Protocol::Options,
        ] {
            assert_eq!(Protocol::try_from(&p.method()).unwrap(), p);
        }
    }

    #[test]
    fn test_unknown_method_is_rejected() {
        let err = "BREW".parse::<Protocol>().unwrap_err();
        assert_eq!(err, MappingError::Protocol("BREW".into()));
    }

    #[test]
    fn test_guard_closes_once_on_drop() {
        let (output, probe) = MemoryOutput::new();
        {
            let mut guard = ChannelGuard::new(Box::new(output));
            assert!(!guard.is_closed());
            guard.close();
            assert!(guard.is_closed());
        }
        assert_eq!(probe.close_calls(), 1);
    }

    #[test]
    fn test_guard_closes_during_unwind() {
        let (output, probe) = MemoryOutput::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = ChannelGuard::new(Box::new(output));
            panic!("boom");
        }));
        assert!(result.is_err());
        assert_eq!(probe.close_calls(), 1);
    }
}

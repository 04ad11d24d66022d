//! HTTP/1.1 transport on `tiny_http`.
//!
//! `tiny_http` owns the sockets: connections are accepted and request heads
//! are parsed on its own threads, so a slow client never holds an acceptor.
//! [`TcpInput`] turns each finished head into a [`Request`] and the reply
//! goes back through [`TcpOutput`].

#![deny(clippy::inefficient_to_string)]
#![deny(clippy::format_push_string)]
#![deny(clippy::unnecessary_to_owned)]

use crate::channel::{Incoming, Input, Output, Protocol};
use crate::ids::{RequestId, REQUEST_ID_HEADER};
use crate::message::{Request, RequestBuilder, Response, Status};
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE, EXPECT};
use std::io::{self, Cursor, Read};
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use tracing::{debug, info, warn};

/// Largest form body decoded into parameters.
///
/// `tiny_http` buffers bodies up to this size while reading the head, so
/// decoding them never blocks the acceptor on the client.
pub const MAX_FORM_BODY_BYTES: usize = 1024;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Pulls parsed requests off a `tiny_http` server.
pub struct TcpInput {
    server: tiny_http::Server,
    local_addr: SocketAddr,
    shut: AtomicBool,
}

impl TcpInput {
    pub fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let server = tiny_http::Server::http(addr).map_err(io::Error::other)?;
        let local_addr = server
            .server_addr()
            .to_ip()
            .ok_or_else(|| io::Error::other("listener is not bound to an IP address"))?;
        info!(addr = %local_addr, "TCP input listening");
        Ok(Self {
            server,
            local_addr,
            shut: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn is_shut(&self) -> bool {
        self.shut.load(Ordering::Acquire)
    }

    /// `unblock` wakes a single `recv`; every acceptor that leaves passes it on.
    fn leave(&self) -> io::Result<Option<Incoming>> {
        self.server.unblock();
        Ok(None)
    }
}

impl Input for TcpInput {
    fn wait_for_incoming_request(&self) -> io::Result<Option<Incoming>> {
        loop {
            if self.is_shut() {
                return self.leave();
            }

            let mut incoming = match self.server.recv() {
                Ok(incoming) => incoming,
                Err(e) if self.is_shut() => {
                    debug!(error = %e, "Receive ended by shutdown");
                    return self.leave();
                }
                Err(e) => return Err(e),
            };

            let peer = incoming
                .remote_addr()
                .map_or_else(|| "unknown".to_string(), ToString::to_string);

            if self.is_shut() {
                debug!(peer = %peer, "Request arrived during shutdown");
                reject(incoming, &peer, Rejection::new(503, "server is shutting down"));
                return self.leave();
            }

            match read_request(&mut incoming, &peer) {
                Ok(request) => {
                    debug!(
                        request_id = %request.request_id(),
                        peer = %peer,
                        method = %request.protocol(),
                        path = request.command_line().unwrap_or_default(),
                        "Request received"
                    );
                    let output: Box<dyn Output> = Box::new(TcpOutput::new(incoming, peer));
                    return Ok(Some((request, output)));
                }
                Err(rejection) => reject(incoming, &peer, rejection),
            }
        }
    }

    fn shutdown(&self) {
        if !self.shut.swap(true, Ordering::AcqRel) {
            info!(addr = %self.local_addr, "TCP input shutting down");
            self.server.unblock();
        }
    }

    fn describe(&self) -> String {
        format!("tcp://{}", self.local_addr)
    }
}

/// A request answered by the transport without reaching the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub code: u16,
    pub reason: String,
}

impl Rejection {
    fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

/// Answer `incoming` with `rejection`.
///
/// Dropping a `tiny_http` request drains whatever body it still has, so the
/// reply is written from a short-lived thread rather than the acceptor.
fn reject(incoming: tiny_http::Request, peer: &str, rejection: Rejection) {
    warn!(peer, code = rejection.code, reason = %rejection.reason, "Rejecting request");
    let peer = peer.to_string();
    let spawned = thread::Builder::new()
        .name("brrtd-reject".to_string())
        .spawn(move || {
            let reply = tiny_http::Response::from_string(rejection.reason)
                .with_status_code(rejection.code);
            if let Err(e) = incoming.respond(reply) {
                debug!(peer = %peer, error = %e, "Rejection not delivered");
            }
        });
    if let Err(e) = spawned {
        warn!(error = %e, "Failed to spawn rejection writer");
    }
}

/// Build a [`Request`] from a `tiny_http` request.
///
/// Query parameters and small `application/x-www-form-urlencoded` bodies
/// both feed the parameter map. Other bodies are left unread.
///
/// # Errors
///
/// Returns the status the transport should answer with when the request
/// cannot be represented: an unsupported method, a header that is not valid
/// HTTP, or a form body that is too large or not length-delimited.
pub fn read_request(incoming: &mut tiny_http::Request, source: &str) -> Result<Request, Rejection> {
    let method = incoming.method().to_string();
    let protocol: Protocol = method
        .parse()
        .map_err(|_| Rejection::new(501, format!("method `{method}` is not supported")))?;

    let (path, query) = match incoming.url().split_once('?') {
        Some((path, query)) => (path.to_string(), Some(query.to_string())),
        None => (incoming.url().to_string(), None),
    };

    let mut builder = RequestBuilder::new(protocol)
        .source(source)
        .command_line(path);
    let mut request_id = None;
    let mut form_body = false;
    let mut expects_continue = false;

    for header in incoming.headers() {
        let name = HeaderName::from_bytes(header.field.as_str().as_bytes())
            .map_err(|e| Rejection::new(400, e.to_string()))?;
        let value = HeaderValue::from_bytes(header.value.as_bytes())
            .map_err(|e| Rejection::new(400, e.to_string()))?;

        if name == CONTENT_TYPE {
            form_body = value
                .to_str()
                .is_ok_and(|v| v.starts_with(FORM_CONTENT_TYPE));
        } else if name == EXPECT {
            expects_continue = true;
        } else if name.as_str() == REQUEST_ID_HEADER {
            request_id = value.to_str().ok().map(str::to_owned);
        }
        builder = builder.header(name, value);
    }

    if let Some(query) = query {
        for (k, v) in url::form_urlencoded::parse(query.as_bytes()) {
            builder = builder.parameter(k, v);
        }
    }

    if form_body {
        let length = match incoming.body_length() {
            None => return Err(Rejection::new(411, "form body needs a content-length")),
            Some(n) if n > MAX_FORM_BODY_BYTES => {
                return Err(Rejection::new(413, format!("form body of {n} bytes too large")))
            }
            Some(_) if expects_continue => {
                return Err(Rejection::new(417, "form bodies are not sent after 100-continue"))
            }
            Some(n) => n,
        };
        let mut body = Vec::with_capacity(length);
        incoming
            .as_reader()
            .take(length as u64)
            .read_to_end(&mut body)
            .map_err(|e| Rejection::new(400, e.to_string()))?;
        for (k, v) in url::form_urlencoded::parse(&body) {
            builder = builder.parameter(k, v);
        }
    }

    Ok(builder
        .request_id(RequestId::from_header_or_new(request_id.as_deref()))
        .build())
}

/// Writes the reply for one `tiny_http` request.
///
/// Closing without a reply answers `500` so the client is never left
/// waiting on a connection `tiny_http` keeps alive.
pub struct TcpOutput {
    request: Option<tiny_http::Request>,
    peer: String,
    closed: bool,
}

impl TcpOutput {
    #[must_use]
    pub fn new(request: tiny_http::Request, peer: impl Into<String>) -> Self {
        Self {
            request: Some(request),
            peer: peer.into(),
            closed: false,
        }
    }

    fn write_reply(&mut self, status: Status, response: &Response) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "reply on closed channel",
            ));
        }
        let reply = build_reply(status, response)?;
        let request = self.request.take().ok_or_else(|| {
            io::Error::new(io::ErrorKind::AlreadyExists, "reply already sent")
        })?;
        request.respond(reply)?;
        debug!(peer = %self.peer, status = status.code(), "Reply written");
        Ok(())
    }
}

fn header(name: &str, value: &[u8]) -> io::Result<tiny_http::Header> {
    tiny_http::Header::from_bytes(name.as_bytes(), value).map_err(|()| {
        io::Error::new(io::ErrorKind::InvalidData, format!("header `{name}` is not ASCII"))
    })
}

/// Translate a reply. Redirect and proxy replies carry the body as their
/// `Location` and have no payload.
///
/// # Errors
///
/// Fails with [`io::ErrorKind::InvalidData`] when a header value, the
/// location included, is not a valid HTTP header value. Control characters
/// such as CR and LF never reach the wire.
pub fn build_reply(
    status: Status,
    response: &Response,
) -> io::Result<tiny_http::Response<Cursor<Vec<u8>>>> {
    let location = matches!(status, Status::Redirect | Status::Proxy);
    let payload = if location {
        Vec::new()
    } else {
        response.body().as_bytes().to_vec()
    };

    let mut reply = tiny_http::Response::from_data(payload).with_status_code(status.code());
    for (name, value) in response.headers() {
        reply.add_header(header(name.as_str(), value.as_bytes())?);
    }
    if location {
        let target = HeaderValue::from_str(response.body()).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid location {:?}: {e}", response.body()),
            )
        })?;
        reply.add_header(header("Location", target.as_bytes())?);
    }
    Ok(reply)
}

impl Output for TcpOutput {
    fn send_ok(&mut self, response: &Response) -> io::Result<()> {
        self.write_reply(Status::Ok, response)
    }

    fn send_redirect(&mut self, response: &Response) -> io::Result<()> {
        self.write_reply(Status::Redirect, response)
    }

    fn send_proxy(&mut self, response: &Response) -> io::Result<()> {
        self.write_reply(Status::Proxy, response)
    }

    fn send_not_found(&mut self, response: &Response) -> io::Result<()> {
        self.write_reply(Status::NotFound, response)
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(request) = self.request.take() {
            debug!(peer = %self.peer, "Closing without a reply");
            if let Err(e) = request.respond(tiny_http::Response::empty(500)) {
                debug!(peer = %self.peer, error = %e, "Close reply not delivered");
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

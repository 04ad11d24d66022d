#![allow(clippy::unwrap_used, clippy::expect_used)]

//! End-to-end tests for the acceptor server
//!
//! # Test Coverage
//!
//! - In-memory transport: requests in, replies out, acceptors stop cleanly
//! - TCP transport with the standard handlers (`/version`, `/login`, not found)
//! - Redirect replies carry a `Location` header
//! - Stopping the server while acceptors are blocked on the input
//! - Redirect targets with line breaks never reach the wire
//! - A client that stalls mid-request does not block the acceptor
//! - `HEAD` replies carry no body

use brrtdispatch::channel::memory::memory_channel;
use brrtdispatch::channel::{Input, Protocol};
use brrtdispatch::config::PipelineConfig;
use brrtdispatch::datastore::{Datastore, MemoryDatastore};
use brrtdispatch::dispatcher::{handler_fn, Dispatcher};
use brrtdispatch::handlers::{standard_registry, LoginHandler};
use brrtdispatch::listener::{ReplyListener, ResultListener};
use brrtdispatch::message::{DataType, RequestBuilder, Response, Status};
use brrtdispatch::pipeline::ShutdownMode;
use brrtdispatch::router::Registry;
use brrtdispatch::server::{Server, ServerHandle, TcpInput};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(10);

fn reply_dispatcher(registry: Registry) -> Arc<Dispatcher> {
    let listener: Arc<dyn ResultListener> = Arc::new(ReplyListener::new());
    let config = PipelineConfig {
        buffer_size: 64,
        workers: 2,
        ..PipelineConfig::default()
    };
    Arc::new(Dispatcher::new(registry, &config, Some(listener)).unwrap())
}

#[test]
fn test_memory_transport_round_trip() {
    let registry = Registry::builder()
        .default_handler(handler_fn("missing", |_| {
            Ok(Response::not_found().with_body("[]").into())
        }))
        .route(
            "/greet",
            handler_fn("greet", |req| {
                let name = req.single_parameter("name").unwrap_or("world");
                Ok(Response::ok(DataType::Json)
                    .with_body(serde_json::json!({ "hello": name }).to_string())
                    .into())
            }),
        )
        .build()
        .unwrap();

    let (connector, input) = memory_channel();
    let input: Arc<dyn Input> = Arc::new(input);
    let handle = Server::new(input, reply_dispatcher(registry), 3).start().unwrap();

    let probes: Vec<_> = (0..200)
        .map(|i| {
            let request = RequestBuilder::new(Protocol::Get)
                .command_line("/greet")
                .parameter("name", format!("n{i}"))
                .build();
            connector.submit(request).unwrap()
        })
        .collect();
    let missing = connector
        .submit(RequestBuilder::new(Protocol::Get).command_line("/nope").build())
        .unwrap();

    for (i, probe) in probes.iter().enumerate() {
        assert!(probe.wait_closed(WAIT));
        let body: serde_json::Value = serde_json::from_str(&probe.replies()[0].body).unwrap();
        assert_eq!(body["hello"], format!("n{i}"));
    }
    assert!(missing.wait_closed(WAIT));
    assert_eq!(missing.replies()[0].mode, Status::NotFound);

    assert!(handle.dispatcher().is_running());
    handle.stop(ShutdownMode::Graceful);
}

#[test]
fn test_stop_wakes_idle_acceptors() {
    let registry = Registry::builder()
        .default_handler(handler_fn("idle", |_| {
            Ok(Response::not_found().with_body("[]").into())
        }))
        .build()
        .unwrap();
    let (_connector, input) = memory_channel();
    let input: Arc<dyn Input> = Arc::new(input);
    let handle = Server::new(input, reply_dispatcher(registry), 4).start().unwrap();
    // Returns only if every blocked acceptor was woken.
    handle.stop(ShutdownMode::Forceful);
}

struct TcpFixture {
    addr: SocketAddr,
    handle: ServerHandle,
    store: Arc<MemoryDatastore>,
}

fn tcp_server(acceptors: usize) -> TcpFixture {
    let store = Arc::new(MemoryDatastore::new());
    store.start().unwrap();
    LoginHandler::ensure_schema(store.as_ref()).unwrap();
    LoginHandler::register_user(store.as_ref(), "ann", "s3cret").unwrap();

    let shared: Arc<MemoryDatastore> = Arc::clone(&store);
    let dispatcher = reply_dispatcher(standard_registry(shared).unwrap());
    let input = TcpInput::bind("127.0.0.1:0").unwrap();
    let addr = input.local_addr();
    let input: Arc<dyn Input> = Arc::new(input);
    let handle = Server::new(input, dispatcher, acceptors).start().unwrap();
    TcpFixture {
        addr,
        handle,
        store,
    }
}

fn exchange(addr: SocketAddr, raw: &str) -> String {
    let mut stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(WAIT)).unwrap();
    stream.write_all(raw.as_bytes()).unwrap();
    let mut reply = String::new();
    stream.read_to_string(&mut reply).unwrap();
    reply
}

fn body_of(reply: &str) -> &str {
    reply.split_once("\r\n\r\n").map(|(_, b)| b).unwrap_or_default()
}

#[test]
fn test_tcp_version_and_not_found() {
    let fixture = tcp_server(2);

    let reply = exchange(fixture.addr, "GET /version HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n");
    assert!(reply.starts_with("HTTP/1.1 200"), "{reply}");
    let body: serde_json::Value = serde_json::from_str(body_of(&reply)).unwrap();
    assert_eq!(body["name"], "brrtdispatch");

    let reply = exchange(fixture.addr, "GET /no/such/path HTTP/1.1\r\nConnection: close\r\n\r\n");
    assert!(reply.starts_with("HTTP/1.1 404"), "{reply}");
    assert!(body_of(&reply).contains("/no/such/path"));

    fixture.handle.stop(ShutdownMode::Graceful);
}

#[test]
fn test_tcp_login_flow() {
    let fixture = tcp_server(2);

    let form = "user=ann&password=s3cret";
    let reply = exchange(
        fixture.addr,
        &format!(
            "POST /login HTTP/1.1\r\nConnection: close\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: {}\r\n\r\n{form}",
            form.len()
        ),
    );
    assert!(reply.starts_with("HTTP/1.1 200"), "{reply}");
    let body: serde_json::Value = serde_json::from_str(body_of(&reply)).unwrap();
    assert_eq!(body["user"], "ann");
    assert!(body["token"].as_str().is_some_and(|t| !t.is_empty()));

    let reply = exchange(
        fixture.addr,
        "GET /login?user=ann&password=wrong HTTP/1.1\r\nConnection: close\r\n\r\n",
    );
    assert!(reply.starts_with("HTTP/1.1 200"), "{reply}");
    let errors: Vec<String> = serde_json::from_str(body_of(&reply)).unwrap();
    assert_eq!(errors, vec!["invalid credentials".to_string()]);

    let reply = exchange(
        fixture.addr,
        "GET /login?user=ann&password=s3cret&redirect=/home HTTP/1.1\r\nConnection: close\r\n\r\n",
    );
    assert!(reply.starts_with("HTTP/1.1 307"), "{reply}");
    assert!(reply.contains("Location: /home\r\n"));

    assert!(fixture.store.table_exists(brrtdispatch::handlers::SESSIONS_TABLE));
    fixture.handle.stop(ShutdownMode::Graceful);
}

#[test]
fn test_tcp_malformed_request_does_not_stop_server() {
    let fixture = tcp_server(2);

    let mut bad = TcpStream::connect(fixture.addr).unwrap();
    bad.write_all(b"this is not http\r\n\r\n").unwrap();
    drop(bad);

    let reply = exchange(fixture.addr, "GET /version HTTP/1.1\r\nConnection: close\r\n\r\n");
    assert!(reply.starts_with("HTTP/1.1 200"), "{reply}");
    fixture.handle.stop(ShutdownMode::Graceful);
}

#[test]
fn test_tcp_redirect_cannot_inject_headers() {
    let fixture = tcp_server(2);

    let reply = exchange(
        fixture.addr,
        "GET /login?user=ann&password=s3cret&redirect=%2Fhome%0D%0ASet-Cookie%3A%20session%3Devil HTTP/1.1\r\nConnection: close\r\n\r\n",
    );
    let (head, body) = reply.split_once("\r\n\r\n").unwrap();
    assert!(!head.contains("Set-Cookie"), "{reply}");
    assert!(!head.contains("Location"), "{reply}");
    assert!(reply.starts_with("HTTP/1.1 200"), "{reply}");
    let errors: Vec<String> = serde_json::from_str(body).unwrap();
    assert_eq!(errors, vec!["invalid redirect target".to_string()]);

    fixture.handle.stop(ShutdownMode::Graceful);
}

#[test]
fn test_tcp_stalled_client_does_not_block_acceptor() {
    let fixture = tcp_server(1);

    // Half a request head, never finished while the next client is served.
    let mut stalled = TcpStream::connect(fixture.addr).unwrap();
    stalled
        .write_all(b"GET /version HTTP/1.1\r\nHost: slow\r\n")
        .unwrap();

    let reply = exchange(fixture.addr, "GET /version HTTP/1.1\r\nConnection: close\r\n\r\n");
    assert!(reply.starts_with("HTTP/1.1 200"), "{reply}");

    drop(stalled);
    fixture.handle.stop(ShutdownMode::Graceful);
}

#[test]
fn test_tcp_head_reply_has_no_body() {
    let fixture = tcp_server(2);

    let reply = exchange(fixture.addr, "HEAD /version HTTP/1.1\r\nConnection: close\r\n\r\n");
    assert!(reply.starts_with("HTTP/1.1 200"), "{reply}");
    assert_eq!(body_of(&reply), "");

    fixture.handle.stop(ShutdownMode::Graceful);
}

#[test]
fn test_tcp_oversized_form_body_is_refused() {
    let fixture = tcp_server(1);

    let form = format!("user=ann&password=s3cret&pad={}", "x".repeat(2048));
    let reply = exchange(
        fixture.addr,
        &format!(
            "POST /login HTTP/1.1\r\nConnection: close\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: {}\r\n\r\n{form}",
            form.len()
        ),
    );
    assert!(reply.starts_with("HTTP/1.1 413"), "{reply}");

    let reply = exchange(fixture.addr, "GET /version HTTP/1.1\r\nConnection: close\r\n\r\n");
    assert!(reply.starts_with("HTTP/1.1 200"), "{reply}");
    fixture.handle.stop(ShutdownMode::Graceful);
}

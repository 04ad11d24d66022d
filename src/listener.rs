//! Result delivery.
//!
//! A [`ResultListener`] receives the outcome of a handler together with the
//! guarded channel of its request. [`ReplyListener`] is the standard one: it
//! turns every result into exactly one reply and releases the channel on
//! every exit path.

use crate::channel::{ChannelGuard, Output};
use crate::message::{EventResult, Response, Status};
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, warn};

/// Consumes handler results.
///
/// Implementations own the channel from the moment `on_result` is called.
/// Dropping the guard closes it, so an implementation that returns or panics
/// early still releases the connection.
pub trait ResultListener: Send + Sync {
    fn on_result(&self, result: EventResult, channel: ChannelGuard);
}

/// Counters for a [`ReplyListener`].
#[derive(Debug, Default)]
pub struct ListenerMetrics {
    /// Replies written successfully
    pub delivered: AtomicU64,
    /// Replies the output refused
    pub send_failures: AtomicU64,
    /// Handler failures turned into error bodies
    pub handler_failures: AtomicU64,
    /// Empty OK bodies and unsupported results
    pub internal_errors: AtomicU64,
}

impl ListenerMetrics {
    #[must_use]
    pub fn get_delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn get_send_failures(&self) -> u64 {
        self.send_failures.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn get_handler_failures(&self) -> u64 {
        self.handler_failures.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn get_internal_errors(&self) -> u64 {
        self.internal_errors.load(Ordering::Relaxed)
    }
}

/// Writes each result to its channel according to the response status.
///
/// | status     | output call         |
/// |------------|---------------------|
/// | `Ok`       | `send_ok`           |
/// | `Redirect` | `send_redirect`     |
/// | `Proxy`    | `send_proxy`        |
/// | `NotFound` | `send_not_found`    |
///
/// Failed and unsupported results, and OK responses without a body, are
/// answered with an OK JSON array of error strings.
#[derive(Debug, Default)]
pub struct ReplyListener {
    metrics: ListenerMetrics,
}

impl ReplyListener {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn metrics(&self) -> &ListenerMetrics {
        &self.metrics
    }

    fn into_response(&self, result: EventResult) -> Response {
        match result {
            EventResult::Response(response) => {
                if response.status() == Status::Ok && !response.has_body() {
                    self.metrics.internal_errors.fetch_add(1, Ordering::Relaxed);
                    warn!("Handler returned an OK response without a body");
                    Response::error_list(&["handler produced no response body"])
                } else {
                    response
                }
            }
            EventResult::Failed(errors) => {
                self.metrics
                    .handler_failures
                    .fetch_add(1, Ordering::Relaxed);
                if errors.is_empty() {
                    Response::error_list(&["handler failed"])
                } else {
                    Response::error_list(&errors)
                }
            }
            EventResult::Unsupported(kind) => {
                self.metrics.internal_errors.fetch_add(1, Ordering::Relaxed);
                error!(kind = %kind, "Listener received an unsupported result kind");
                Response::error_list(&[format!("unsupported result kind: {kind}")])
            }
        }
    }
}

/// Pick the output call for `response.status()`.
pub fn deliver(output: &mut dyn Output, response: &Response) -> io::Result<()> {
    match response.status() {
        Status::Ok => output.send_ok(response),
        Status::Redirect => output.send_redirect(response),
        Status::Proxy => output.send_proxy(response),
        Status::NotFound => output.send_not_found(response),
    }
}

impl ResultListener for ReplyListener {
    fn on_result(&self, result: EventResult, mut channel: ChannelGuard) {
        let response = self.into_response(result);

        let sent = match channel.output() {
            Some(output) => deliver(output, &response),
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "channel released before delivery",
            )),
        };

        match sent {
            Ok(()) => {
                self.metrics.delivered.fetch_add(1, Ordering::Relaxed);
                debug!(status = response.status_code(), "Reply delivered");
            }
            Err(e) => {
                self.metrics.send_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    status = response.status_code(),
                    error = %e,
                    "Failed to deliver reply"
                );
            }
        }

        channel.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::memory::MemoryOutput;
    use crate::message::DataType;

    fn run(listener: &ReplyListener, result: EventResult) -> crate::channel::memory::OutputProbe {
        let (output, probe) = MemoryOutput::new();
        listener.on_result(result, ChannelGuard::new(Box::new(output)));
        probe
    }

    #[test]
    fn test_ok_response_is_sent_as_is() {
        let listener = ReplyListener::new();
        let probe = run(
            &listener,
            Response::ok(DataType::Html).with_body("<p>hi</p>").into(),
        );
        let replies = probe.replies();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].status_code, 200);
        assert_eq!(replies[0].body, "<p>hi</p>");
        assert_eq!(probe.close_calls(), 1);
        assert_eq!(listener.metrics().get_delivered(), 1);
    }

    #[test]
    fn test_empty_ok_body_becomes_error_list() {
        let listener = ReplyListener::new();
        let probe = run(&listener, Response::ok(DataType::Json).into());
        let replies = probe.replies();
        assert_eq!(replies[0].status_code, 200);
        let errors: Vec<String> = serde_json::from_str(&replies[0].body).unwrap();
        assert!(!errors.is_empty());
        assert_eq!(listener.metrics().get_internal_errors(), 1);
        assert_eq!(probe.close_calls(), 1);
    }

    #[test]
    fn test_failed_result_carries_errors() {
        let listener = ReplyListener::new();
        let probe = run(
            &listener,
            EventResult::Failed(vec!["bad input".into(), "try again".into()]),
        );
        let replies = probe.replies();
        assert_eq!(replies[0].status_code, 200);
        assert_eq!(replies[0].body, r#"["bad input","try again"]"#);
        assert_eq!(listener.metrics().get_handler_failures(), 1);
    }

    #[test]
    fn test_unsupported_result_still_closes() {
        let listener = ReplyListener::new();
        let probe = run(&listener, EventResult::Unsupported("stream".into()));
        assert!(probe.replies()[0].body.contains("stream"));
        assert_eq!(probe.close_calls(), 1);
        assert_eq!(listener.metrics().get_internal_errors(), 1);
    }

    #[test]
    fn test_status_selects_send_path() {
        let listener = ReplyListener::new();
        let cases = [
            (Response::redirect("/next"), 307),
            (Response::proxy("http://proxy:3128"), 305),
            (Response::not_found(), 404),
        ];
        for (response, code) in cases {
            let probe = run(&listener, response.into());
            assert_eq!(probe.replies()[0].status_code, code);
            assert_eq!(probe.close_calls(), 1);
        }
    }

    struct BrokenOutput {
        closes: std::sync::Arc<AtomicU64>,
    }

    impl Output for BrokenOutput {
        fn send_ok(&mut self, _: &Response) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"))
        }
        fn send_redirect(&mut self, r: &Response) -> io::Result<()> {
            self.send_ok(r)
        }
        fn send_proxy(&mut self, r: &Response) -> io::Result<()> {
            self.send_ok(r)
        }
        fn send_not_found(&mut self, r: &Response) -> io::Result<()> {
            self.send_ok(r)
        }
        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
        fn is_closed(&self) -> bool {
            self.closes.load(Ordering::SeqCst) > 0
        }
    }

    #[test]
    fn test_send_failure_still_closes_once() {
        let listener = ReplyListener::new();
        let closes = std::sync::Arc::new(AtomicU64::new(0));
        let output = BrokenOutput {
            closes: closes.clone(),
        };
        listener.on_result(
            Response::ok(DataType::Json).with_body("{}").into(),
            ChannelGuard::new(Box::new(output)),
        );
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert_eq!(listener.metrics().get_send_failures(), 1);
        assert_eq!(listener.metrics().get_delivered(), 0);
    }
}

//! In-process transport.
//!
//! [`memory_channel`] returns a connector that submits requests and an
//! [`Input`] that hands them to acceptors. Every submitted request gets a
//! [`MemoryOutput`] whose replies and close calls are observable through an
//! [`OutputProbe`]. Embedders use it to drive handlers without sockets; the
//! test suite uses it to check the exactly-once delivery contract.

use super::core::{Incoming, Input, Output};
use crate::message::{Request, Response, Status};
use may::sync::mpsc;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// A reply captured by a [`MemoryOutput`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedReply {
    /// Which reply mode was used.
    pub mode: Status,
    pub status_code: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

#[derive(Debug, Default)]
struct ProbeState {
    replies: Mutex<Vec<RecordedReply>>,
    close_calls: AtomicUsize,
    closed: AtomicBool,
}

/// Observer side of a [`MemoryOutput`]. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct OutputProbe {
    state: Arc<ProbeState>,
}

impl OutputProbe {
    fn replies_guard(&self) -> MutexGuard<'_, Vec<RecordedReply>> {
        // A panic while holding this lock only ever happens in test code.
        self.state
            .replies
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Every reply written so far, in order.
    #[must_use]
    pub fn replies(&self) -> Vec<RecordedReply> {
        self.replies_guard().clone()
    }

    /// Number of times `close` was invoked, including redundant calls.
    #[must_use]
    pub fn close_calls(&self) -> usize {
        self.state.close_calls.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::Acquire)
    }

    /// Poll until the channel is closed or `timeout` elapses.
    #[must_use]
    pub fn wait_closed(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.is_closed() {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        true
    }
}

/// [`Output`] that records replies in memory.
#[derive(Debug)]
pub struct MemoryOutput {
    probe: OutputProbe,
}

impl MemoryOutput {
    /// Create an output and the probe that observes it.
    #[must_use]
    pub fn new() -> (Self, OutputProbe) {
        let probe = OutputProbe::default();
        (
            Self {
                probe: probe.clone(),
            },
            probe,
        )
    }

    fn record(&mut self, mode: Status, response: &Response) -> io::Result<()> {
        if self.probe.is_closed() {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "reply on closed channel",
            ));
        }
        let headers = response
            .headers()
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str().to_string(),
                    String::from_utf8_lossy(v.as_bytes()).into_owned(),
                )
            })
            .collect();
        self.probe.replies_guard().push(RecordedReply {
            mode,
            status_code: mode.code(),
            headers,
            body: response.body().to_string(),
        });
        Ok(())
    }
}

impl Output for MemoryOutput {
    fn send_ok(&mut self, response: &Response) -> io::Result<()> {
        self.record(Status::Ok, response)
    }

    fn send_redirect(&mut self, response: &Response) -> io::Result<()> {
        self.record(Status::Redirect, response)
    }

    fn send_proxy(&mut self, response: &Response) -> io::Result<()> {
        self.record(Status::Proxy, response)
    }

    fn send_not_found(&mut self, response: &Response) -> io::Result<()> {
        self.record(Status::NotFound, response)
    }

    fn close(&mut self) {
        self.probe.state.close_calls.fetch_add(1, Ordering::AcqRel);
        self.probe.state.closed.store(true, Ordering::Release);
    }

    fn is_closed(&self) -> bool {
        self.probe.is_closed()
    }
}

enum Message {
    Request(Incoming),
    Shutdown,
}

/// Producer side of the in-memory transport.
#[derive(Clone)]
pub struct MemoryConnector {
    tx: mpsc::Sender<Message>,
}

impl MemoryConnector {
    /// Submit a request and get a probe for its reply channel.
    ///
    /// # Errors
    ///
    /// Returns `BrokenPipe` when the input side has been dropped.
    pub fn submit(&self, request: Request) -> io::Result<OutputProbe> {
        let (output, probe) = MemoryOutput::new();
        self.tx
            .send(Message::Request((request, Box::new(output))))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "memory input dropped"))?;
        Ok(probe)
    }
}

/// [`Input`] fed by a [`MemoryConnector`].
pub struct MemoryInput {
    rx: mpsc::Receiver<Message>,
    // Used to re-broadcast shutdown so every blocked acceptor wakes up.
    wake: mpsc::Sender<Message>,
    shut: AtomicBool,
}

/// Create a connected connector/input pair.
#[must_use]
pub fn memory_channel() -> (MemoryConnector, MemoryInput) {
    let (tx, rx) = mpsc::channel();
    let input = MemoryInput {
        rx,
        wake: tx.clone(),
        shut: AtomicBool::new(false),
    };
    (MemoryConnector { tx }, input)
}

impl Input for MemoryInput {
    fn wait_for_incoming_request(&self) -> io::Result<Option<Incoming>> {
        if self.shut.load(Ordering::Acquire) {
            return Ok(None);
        }
        match self.rx.recv() {
            Ok(Message::Request(incoming)) => Ok(Some(incoming)),
            Ok(Message::Shutdown) => {
                // Pass the wake-up on to the next blocked acceptor.
                let _ = self.wake.send(Message::Shutdown);
                Ok(None)
            }
            Err(_) => Ok(None),
        }
    }

    fn shutdown(&self) {
        if !self.shut.swap(true, Ordering::AcqRel) {
            let _ = self.wake.send(Message::Shutdown);
        }
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

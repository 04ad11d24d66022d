use crate::channel::Input;
use crate::dispatcher::Dispatcher;
use crate::error::{DispatchError, PipelineError};
use crate::pipeline::ShutdownMode;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// Acceptor threads feeding a [`Dispatcher`] from an [`Input`].
///
/// Each acceptor loops on [`Input::wait_for_incoming_request`] and publishes
/// what it gets. Acceptors only block on the input and on ring
/// backpressure; handlers never run on them.
pub struct Server {
    input: Arc<dyn Input>,
    dispatcher: Arc<Dispatcher>,
    acceptors: usize,
}

impl Server {
    #[must_use]
    pub fn new(input: Arc<dyn Input>, dispatcher: Arc<Dispatcher>, acceptors: usize) -> Self {
        Self {
            input,
            dispatcher,
            acceptors: acceptors.max(1),
        }
    }

    /// Spawn the acceptor threads.
    ///
    /// # Errors
    ///
    /// Returns the spawn error if a thread could not be created. Acceptors
    /// started before the failure are stopped first.
    pub fn start(self) -> io::Result<ServerHandle> {
        info!(
            input = %self.input.describe(),
            acceptors = self.acceptors,
            "Starting server"
        );

        let mut threads = Vec::with_capacity(self.acceptors);
        for acceptor_id in 0..self.acceptors {
            let input = Arc::clone(&self.input);
            let dispatcher = Arc::clone(&self.dispatcher);
            let spawned = thread::Builder::new()
                .name(format!("brrtd-acceptor-{acceptor_id}"))
                .spawn(move || accept_loop(&*input, &dispatcher, acceptor_id));

            match spawned {
                Ok(handle) => threads.push(handle),
                Err(e) => {
                    error!(acceptor_id, error = %e, "Failed to spawn acceptor");
                    self.input.shutdown();
                    for handle in threads {
                        let _ = handle.join();
                    }
                    return Err(e);
                }
            }
        }

        Ok(ServerHandle {
            input: self.input,
            dispatcher: self.dispatcher,
            threads,
        })
    }
}

fn accept_loop(input: &dyn Input, dispatcher: &Dispatcher, acceptor_id: usize) {
    debug!(acceptor_id, "Acceptor started");
    loop {
        match input.wait_for_incoming_request() {
            Ok(Some((request, output))) => match dispatcher.dispatch(request, output) {
                Ok(_) => {}
                Err(DispatchError::Pipeline(PipelineError::ShutDown)) => {
                    debug!(acceptor_id, "Dispatcher stopped; acceptor exiting");
                    break;
                }
                Err(e) => warn!(acceptor_id, error = %e, "Dispatch failed"),
            },
            Ok(None) => break,
            Err(e) => {
                error!(acceptor_id, error = %e, "Input failed; acceptor exiting");
                break;
            }
        }
    }
    debug!(acceptor_id, "Acceptor exiting");
}

/// Handle to a running [`Server`].
pub struct ServerHandle {
    input: Arc<dyn Input>,
    dispatcher: Arc<Dispatcher>,
    threads: Vec<JoinHandle<()>>,
}

impl ServerHandle {
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Stop accepting, wait for the acceptors, then stop the pipeline.
    pub fn stop(self, mode: ShutdownMode) {
        info!(mode = ?mode, "Stopping server");
        self.input.shutdown();
        self.finish(mode);
    }

    /// Wait until the input is exhausted, then drain the pipeline.
    ///
    /// # Errors
    ///
    /// Returns the panic payload of the first acceptor that panicked.
    pub fn join(self) -> thread::Result<()> {
        let mut outcome = Ok(());
        for handle in self.threads {
            if let Err(panic) = handle.join() {
                if outcome.is_ok() {
                    outcome = Err(panic);
                }
            }
        }
        self.dispatcher.shutdown(ShutdownMode::Graceful);
        outcome
    }

    fn finish(self, mode: ShutdownMode) {
        for handle in self.threads {
            if handle.join().is_err() {
                error!("Acceptor thread panicked");
            }
        }
        self.dispatcher.shutdown(mode);
        info!(
            published = self.dispatcher.metrics().get_published(),
            processed = self.dispatcher.metrics().get_processed(),
            "Server stopped"
        );
    }
}

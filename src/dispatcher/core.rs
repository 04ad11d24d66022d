#![deny(clippy::inefficient_to_string)]
#![deny(clippy::format_push_string)]
#![deny(clippy::unnecessary_to_owned)]

use super::handler::EventHandler;
use crate::channel::{ChannelGuard, Output};
use crate::config::PipelineConfig;
use crate::error::DispatchError;
use crate::listener::ResultListener;
use crate::message::{EventResult, Request};
use crate::pipeline::{
    panic_message, EventConsumer, EventSlot, Pipeline, PipelineMetrics, ShutdownMode,
};
use crate::router::{CommandRouter, Registry};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Name of the single worker group draining the dispatch ring.
pub const DISPATCH_GROUP: &str = "dispatch";

/// One routed request on its way to a worker.
pub struct DispatchEvent {
    pub request: Request,
    pub channel: ChannelGuard,
    pub handler: Arc<dyn EventHandler>,
    pub listener: Option<Arc<dyn ResultListener>>,
}

impl fmt::Debug for DispatchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchEvent")
            .field("request_id", &self.request.request_id())
            .field("handler", &self.handler.name())
            .field("listener", &self.listener.is_some())
            .finish()
    }
}

/// Reusable ring slot for the dispatch pipeline.
///
/// Holds at most one [`DispatchEvent`]. Clearing drops the event, which
/// closes its channel if nothing else did.
#[derive(Debug, Default)]
pub struct EventWrapper {
    event: Option<DispatchEvent>,
}

impl EventWrapper {
    pub fn take(&mut self) -> Option<DispatchEvent> {
        self.event.take()
    }
}

impl EventSlot for EventWrapper {
    type Payload = DispatchEvent;

    fn load(&mut self, payload: DispatchEvent) {
        self.event = Some(payload);
    }

    fn clear(&mut self) {
        self.event = None;
    }

    fn is_clear(&self) -> bool {
        self.event.is_none()
    }
}

/// Runs the bound handler and hands the result to the listener.
///
/// Handler errors and panics become [`EventResult::Failed`] so the client
/// still gets a reply. Without a listener the channel is closed unanswered.
#[derive(Debug, Default)]
pub struct DispatchConsumer;

impl DispatchConsumer {
    fn run(event: DispatchEvent, sequence: u64) {
        let DispatchEvent {
            request,
            channel,
            handler,
            listener,
        } = event;
        let request_id = request.request_id();

        debug!(
            request_id = %request_id,
            sequence,
            handler = handler.name(),
            "Worker processing request"
        );

        let result = match catch_unwind(AssertUnwindSafe(|| handler.handle(&request))) {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                warn!(
                    request_id = %request_id,
                    handler = handler.name(),
                    error = %e,
                    "Handler failed"
                );
                EventResult::Failed(e.chain().map(ToString::to_string).collect())
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(
                    request_id = %request_id,
                    handler = handler.name(),
                    panic_message = %message,
                    "Handler panicked - CRITICAL"
                );
                EventResult::Failed(vec![format!("handler panicked: {message}")])
            }
        };

        match listener {
            Some(listener) => listener.on_result(result, channel),
            None => drop(channel),
        }
    }
}

impl EventConsumer<EventWrapper> for DispatchConsumer {
    fn on_event(&self, slot: &mut EventWrapper, sequence: u64) {
        match slot.take() {
            Some(event) => Self::run(event, sequence),
            None => warn!(sequence, "Published slot held no event"),
        }
    }

    fn on_panic(&self, slot: &mut EventWrapper, sequence: u64, message: &str) {
        error!(sequence, panic_message = %message, "Dispatch worker panicked");
        // Only reachable if the panic hit before the event left the slot.
        if let Some(event) = slot.take() {
            if let Some(listener) = event.listener {
                listener.on_result(
                    EventResult::Failed(vec![format!("dispatch failed: {message}")]),
                    event.channel,
                );
            }
        }
    }
}

/// Front door of the dispatch core.
///
/// Resolves each request's handler, publishes it into the ring and lets the
/// worker group run it. Created once at startup and shared by the acceptors.
pub struct Dispatcher {
    router: CommandRouter,
    pipeline: Pipeline<EventWrapper>,
    listener: Option<Arc<dyn ResultListener>>,
}

impl Dispatcher {
    pub fn new(
        registry: Registry,
        config: &PipelineConfig,
        listener: Option<Arc<dyn ResultListener>>,
    ) -> Result<Self, DispatchError> {
        let pipeline = Pipeline::builder("brrtd", config.buffer_size, EventWrapper::default)
            .worker_group(DISPATCH_GROUP, config.workers, DispatchConsumer)
            .stack_size(config.stack_size)
            .start()?;

        Ok(Self {
            router: CommandRouter::new(registry),
            pipeline,
            listener,
        })
    }

    /// Route `request` and queue it for a worker.
    ///
    /// Blocks while the ring is full. After shutdown the request is refused
    /// and `output` is closed before this returns.
    pub fn dispatch(&self, request: Request, output: Box<dyn Output>) -> Result<u64, DispatchError> {
        let channel = ChannelGuard::new(output);
        let (request, handler) = self.router.route(request);
        let request_id = request.request_id();

        let event = DispatchEvent {
            request,
            channel,
            handler,
            listener: self.listener.clone(),
        };

        match self.pipeline.publish(event) {
            Ok(sequence) => {
                debug!(request_id = %request_id, sequence, "Request published");
                Ok(sequence)
            }
            Err(e) => {
                warn!(request_id = %request_id, error = %e, "Request refused");
                Err(e.into())
            }
        }
    }

    #[must_use]
    pub fn router(&self) -> &CommandRouter {
        &self.router
    }

    #[must_use]
    pub fn metrics(&self) -> &PipelineMetrics {
        self.pipeline.metrics()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.pipeline.is_running()
    }

    pub fn shutdown(&self, mode: ShutdownMode) {
        self.pipeline.shutdown(mode);
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("router", &self.router)
            .field("pipeline", &self.pipeline)
            .field("listener", &self.listener.is_some())
            .finish()
    }
}

#![deny(clippy::inefficient_to_string)]
#![deny(clippy::format_push_string)]
#![deny(clippy::unnecessary_to_owned)]

use super::metrics::PipelineMetrics;
use super::ring::{lock, RingBuffer};
use super::EventSlot;
use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

/// Processes events taken from the ring.
///
/// Every consumer of a worker group runs for every published event, in
/// sequence order per group. Threads within one group share the work: each
/// sequence goes to exactly one of them.
pub trait EventConsumer<E>: Send + Sync {
    fn on_event(&self, slot: &mut E, sequence: u64);

    /// Called with the same slot when `on_event` panicked. The slot is
    /// cleared afterwards either way.
    fn on_panic(&self, slot: &mut E, sequence: u64, message: &str) {
        let _ = slot;
        error!(sequence, panic_message = %message, "Event consumer panicked");
    }
}

/// How [`Pipeline::shutdown`] treats events that are already in the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ShutdownMode {
    /// Refuse new events, process everything already claimed, then stop.
    Graceful,
    /// Stop after each worker's current event. Remaining events are
    /// cleared without being processed.
    Forceful,
}

struct WorkerGroup<E> {
    name: String,
    threads: usize,
    consumer: Arc<dyn EventConsumer<E>>,
}

/// Configures and starts a [`Pipeline`].
pub struct PipelineBuilder<E> {
    name: String,
    capacity: usize,
    factory: Box<dyn FnMut() -> E>,
    groups: Vec<WorkerGroup<E>>,
    stack_size: Option<usize>,
}

impl<E: EventSlot> PipelineBuilder<E> {
    /// `capacity` must be a power of two. `factory` is called once per slot
    /// at start; slots are reused for the pipeline's lifetime.
    pub fn new<F>(name: impl Into<String>, capacity: usize, factory: F) -> Self
    where
        F: FnMut() -> E + 'static,
    {
        Self {
            name: name.into(),
            capacity,
            factory: Box::new(factory),
            groups: Vec::new(),
            stack_size: None,
        }
    }

    /// Add a worker group of `threads` threads running `consumer`.
    #[must_use]
    pub fn worker_group<C>(mut self, name: impl Into<String>, threads: usize, consumer: C) -> Self
    where
        C: EventConsumer<E> + 'static,
    {
        self.groups.push(WorkerGroup {
            name: name.into(),
            threads,
            consumer: Arc::new(consumer),
        });
        self
    }

    /// Stack size for worker threads. Platform default when unset.
    #[must_use]
    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    pub fn start(mut self) -> Result<Pipeline<E>, PipelineError> {
        if let Some(empty) = self.groups.iter().find(|g| g.threads == 0) {
            return Err(PipelineError::EmptyWorkerGroup(empty.name.clone()));
        }
        let ring = Arc::new(RingBuffer::new(
            self.capacity,
            self.groups.len(),
            &mut self.factory,
        )?);

        info!(
            pipeline = %self.name,
            capacity = self.capacity,
            groups = self.groups.len(),
            threads = self.groups.iter().map(|g| g.threads).sum::<usize>(),
            "Starting pipeline"
        );

        let mut workers = Vec::new();
        for (group_idx, group) in self.groups.iter().enumerate() {
            for worker_id in 0..group.threads {
                let thread_name = format!("{}-{}-{}", self.name, group.name, worker_id);
                let mut builder = std::thread::Builder::new().name(thread_name.clone());
                if let Some(size) = self.stack_size {
                    builder = builder.stack_size(size);
                }

                let worker_ring = Arc::clone(&ring);
                let consumer = Arc::clone(&group.consumer);
                let spawned =
                    builder.spawn(move || run_worker(&worker_ring, group_idx, &*consumer));

                match spawned {
                    Ok(handle) => workers.push(handle),
                    Err(e) => {
                        error!(
                            thread = %thread_name,
                            error = %e,
                            "Failed to spawn pipeline worker"
                        );
                        ring.halt();
                        for handle in workers {
                            let _ = handle.join();
                        }
                        return Err(PipelineError::Spawn {
                            name: thread_name,
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }

        Ok(Pipeline {
            name: self.name,
            ring,
            workers: Mutex::new(workers),
        })
    }
}

/// A running ring buffer with its worker threads.
///
/// Dropping a pipeline that was not shut down performs a graceful shutdown.
pub struct Pipeline<E: EventSlot> {
    name: String,
    ring: Arc<RingBuffer<E>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl<E: EventSlot> Pipeline<E> {
    pub fn builder<F>(name: impl Into<String>, capacity: usize, factory: F) -> PipelineBuilder<E>
    where
        F: FnMut() -> E + 'static,
    {
        PipelineBuilder::new(name, capacity, factory)
    }

    /// Publish `payload`. See [`Pipeline::publish_with`].
    ///
    /// On failure the payload is dropped, which releases whatever it owns.
    pub fn publish(&self, payload: E::Payload) -> Result<u64, PipelineError> {
        self.ring.publish_with(move |slot| slot.load(payload))
    }

    /// Claim a slot, fill it with `translate`, and hand it to the workers.
    ///
    /// Blocks while the ring is full. Fails with [`PipelineError::ShutDown`]
    /// once shutdown has started; `translate` is not called in that case.
    ///
    /// A panic in `translate` propagates to the caller. The claimed slot is
    /// cleared and skipped by the workers, so the pipeline keeps running.
    pub fn publish_with<F>(&self, translate: F) -> Result<u64, PipelineError>
    where
        F: FnOnce(&mut E),
    {
        self.ring.publish_with(translate)
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    #[must_use]
    pub fn metrics(&self) -> &PipelineMetrics {
        self.ring.metrics()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.ring.is_accepting()
    }

    /// Stop the pipeline and join its workers. Calling it again is a no-op.
    ///
    /// Concurrent callers all return only once the workers have exited.
    pub fn shutdown(&self, mode: ShutdownMode) {
        // Held until the end: a second caller waits here for the first.
        let mut workers = lock(&self.workers);
        if workers.is_empty() {
            return;
        }

        info!(pipeline = %self.name, mode = ?mode, "Shutting down pipeline");
        match mode {
            ShutdownMode::Graceful => self.ring.close(),
            ShutdownMode::Forceful => self.ring.halt(),
        }

        for handle in workers.drain(..) {
            if handle.join().is_err() {
                error!(pipeline = %self.name, "Pipeline worker exited by panic");
            }
        }

        let abandoned = self.ring.clear_abandoned();
        if abandoned > 0 {
            warn!(pipeline = %self.name, abandoned, "Dropped unprocessed events");
        }
        info!(
            pipeline = %self.name,
            published = self.metrics().get_published(),
            processed = self.metrics().get_processed(),
            "Pipeline stopped"
        );
    }
}

impl<E: EventSlot> Drop for Pipeline<E> {
    fn drop(&mut self) {
        self.shutdown(ShutdownMode::Graceful);
    }
}

impl<E: EventSlot> fmt::Debug for Pipeline<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("capacity", &self.capacity())
            .field("running", &self.is_running())
            .finish()
    }
}

fn run_worker<E: EventSlot>(ring: &RingBuffer<E>, group: usize, consumer: &dyn EventConsumer<E>) {
    debug!(group, "Pipeline worker started");

    while let Some(sequence) = ring.next_for(group) {
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let mut slot = ring.slot(sequence);
            consumer.on_event(&mut slot, sequence);
        }));

        if let Err(panic) = outcome {
            ring.metrics().record_panic();
            let message = panic_message(panic.as_ref());
            let recovered = catch_unwind(AssertUnwindSafe(|| {
                let mut slot = ring.slot(sequence);
                consumer.on_panic(&mut slot, sequence, &message);
            }));
            if recovered.is_err() {
                error!(sequence, panic_message = %message, "Panic handler panicked");
            }
        }

        ring.release(sequence);
    }

    debug!(group, "Pipeline worker exiting");
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_variants() {
        assert_eq!(panic_message(&"boom"), "boom");
        assert_eq!(panic_message(&String::from("bang")), "bang");
        assert_eq!(panic_message(&42u8), "non-string panic payload");
    }

    #[derive(Default)]
    struct Slot(Option<u64>);

    impl EventSlot for Slot {
        type Payload = u64;

        fn load(&mut self, payload: u64) {
            self.0 = Some(payload);
        }
        fn clear(&mut self) {
            self.0 = None;
        }
        fn is_clear(&self) -> bool {
            self.0.is_none()
        }
    }

    struct Noop;

    impl EventConsumer<Slot> for Noop {
        fn on_event(&self, _slot: &mut Slot, _sequence: u64) {}
    }

    #[test]
    fn test_start_rejects_empty_group() {
        let err = Pipeline::builder("t", 8, Slot::default)
            .worker_group("idle", 0, Noop)
            .start()
            .unwrap_err();
        assert_eq!(err, PipelineError::EmptyWorkerGroup("idle".into()));
    }

    #[test]
    fn test_start_rejects_no_groups() {
        let err = Pipeline::builder("t", 8, Slot::default).start().unwrap_err();
        assert_eq!(err, PipelineError::NoWorkerGroups);
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let pipeline = Pipeline::builder("t", 8, Slot::default)
            .worker_group("w", 1, Noop)
            .start()
            .unwrap();
        pipeline.publish(1).unwrap();
        pipeline.shutdown(ShutdownMode::Graceful);
        pipeline.shutdown(ShutdownMode::Forceful);
        assert!(!pipeline.is_running());
        assert_eq!(pipeline.metrics().get_processed(), 1);
    }
}

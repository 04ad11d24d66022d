//! # Pipeline Module
//!
//! Bounded, preallocated event ring with worker groups.
//!
//! Producers publish into slots of a fixed power-of-two ring. Each worker
//! group sees every event in sequence order; threads inside a group split
//! the events between them. A slot is cleared and reused once every group
//! has finished with it, and a producer that finds its slot still busy
//! blocks until it is freed.
//!
//! ```text
//! producer ──publish──► [ s0 | s1 | s2 | ... | sN-1 ] ──► group "dispatch" (k threads)
//!                          ▲                         └──► group "audit"    (1 thread)
//!                          └────── cleared by the last group to finish
//! ```
//!
//! Panics inside a consumer are caught at the worker boundary and reported
//! through [`EventConsumer::on_panic`]; the worker keeps running.

mod core;
mod metrics;
mod ring;

pub use self::core::{EventConsumer, Pipeline, PipelineBuilder, ShutdownMode};
pub(crate) use self::core::panic_message;
pub use metrics::PipelineMetrics;

/// A reusable ring slot.
///
/// Slots are created once by the pipeline's factory and cleared after each
/// event. Clearing must release everything the event owned.
pub trait EventSlot: Send + 'static {
    /// What a producer hands to [`Pipeline::publish`].
    type Payload: Send;

    /// Move `payload` into this (cleared) slot.
    fn load(&mut self, payload: Self::Payload);
    fn clear(&mut self);
    fn is_clear(&self) -> bool;
}

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one pipeline.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    /// Events published into the ring
    pub published: AtomicU64,
    /// Events processed by every worker group and released
    pub processed: AtomicU64,
    /// Panics caught at the worker boundary
    pub panics: AtomicU64,
    /// Publishes that had to wait for a free slot
    pub publisher_waits: AtomicU64,
    /// Events dropped unprocessed by a forceful shutdown
    pub abandoned: AtomicU64,
}

impl PipelineMetrics {
    pub fn record_publish(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_panic(&self) {
        self.panics.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_publisher_wait(&self) {
        self.publisher_waits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_abandoned(&self, count: u64) {
        self.abandoned.fetch_add(count, Ordering::Relaxed);
    }

    #[must_use]
    pub fn get_published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn get_processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn get_panics(&self) -> u64 {
        self.panics.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn get_publisher_waits(&self) -> u64 {
        self.publisher_waits.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn get_abandoned(&self) -> u64 {
        self.abandoned.load(Ordering::Relaxed)
    }

    /// Published but not yet released.
    #[must_use]
    pub fn in_flight(&self) -> u64 {
        self.get_published()
            .saturating_sub(self.get_processed() + self.get_abandoned())
    }
}

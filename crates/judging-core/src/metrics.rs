//! Global atomic counters for judging activity.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at the end of a CLI command).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lock-free counters.
pub struct Metrics {
    scores_submitted: AtomicU64,
    scores_replaced: AtomicU64,
    calculations_completed: AtomicU64,
    calculations_aborted: AtomicU64,
    allocation_writes: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            scores_submitted: AtomicU64::new(0),
            scores_replaced: AtomicU64::new(0),
            calculations_completed: AtomicU64::new(0),
            calculations_aborted: AtomicU64::new(0),
            allocation_writes: AtomicU64::new(0),
        }
    }

    /// Count an accepted score; `replaced` also bumps the replaced counter.
    pub fn inc_scores_submitted(&self, replaced: bool) {
        self.scores_submitted.fetch_add(1, Ordering::Relaxed);
        if replaced {
            self.scores_replaced.fetch_add(1, Ordering::Relaxed);
        }
        tracing::trace!(metric = "scores_submitted", "counter incremented");
    }

    pub fn inc_calculations_completed(&self) {
        self.calculations_completed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "calculations_completed", "counter incremented");
    }

    pub fn inc_calculations_aborted(&self) {
        self.calculations_aborted.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "calculations_aborted", "counter incremented");
    }

    pub fn inc_allocation_writes(&self) {
        self.allocation_writes.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "allocation_writes", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            scores_submitted = self.scores_submitted(),
            scores_replaced = self.scores_replaced(),
            calculations_completed = self.calculations_completed(),
            calculations_aborted = self.calculations_aborted(),
            allocation_writes = self.allocation_writes(),
        );
    }

    pub fn scores_submitted(&self) -> u64 {
        self.scores_submitted.load(Ordering::Relaxed)
    }

    pub fn scores_replaced(&self) -> u64 {
        self.scores_replaced.load(Ordering::Relaxed)
    }

    pub fn calculations_completed(&self) -> u64 {
        self.calculations_completed.load(Ordering::Relaxed)
    }

    pub fn calculations_aborted(&self) -> u64 {
        self.calculations_aborted.load(Ordering::Relaxed)
    }

    pub fn allocation_writes(&self) -> u64 {
        self.allocation_writes.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.scores_submitted.store(0, Ordering::Relaxed);
        self.scores_replaced.store(0, Ordering::Relaxed);
        self.calculations_completed.store(0, Ordering::Relaxed);
        self.calculations_aborted.store(0, Ordering::Relaxed);
        self.allocation_writes.store(0, Ordering::Relaxed);
    }
}

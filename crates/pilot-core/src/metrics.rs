//! Process-wide counters for one pilot invocation.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit the current values as a single
//! `tracing::info!` event at the end of a run.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters.
pub struct Metrics {
    polls: AtomicU64,
    gating_actions: AtomicU64,
    reloads: AtomicU64,
    phase_retries: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            polls: AtomicU64::new(0),
            gating_actions: AtomicU64::new(0),
            reloads: AtomicU64::new(0),
            phase_retries: AtomicU64::new(0),
        }
    }

    /// One badge observation.
    pub fn inc_polls(&self) {
        self.polls.fetch_add(1, Ordering::Relaxed);
    }

    /// One click on a gating control.
    pub fn inc_gating_actions(&self) {
        self.gating_actions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_reloads(&self) {
        self.reloads.fetch_add(1, Ordering::Relaxed);
    }

    /// One whole-phase retry issued by the retry executor.
    pub fn inc_phase_retries(&self) {
        self.phase_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn polls(&self) -> u64 {
        self.polls.load(Ordering::Relaxed)
    }

    pub fn gating_actions(&self) -> u64 {
        self.gating_actions.load(Ordering::Relaxed)
    }

    pub fn reloads(&self) -> u64 {
        self.reloads.load(Ordering::Relaxed)
    }

    pub fn phase_retries(&self) -> u64 {
        self.phase_retries.load(Ordering::Relaxed)
    }

    /// Emit all counters as one structured event.
    pub fn flush(&self) {
        tracing::info!(
            event = "metrics.flush",
            polls = self.polls(),
            gating_actions = self.gating_actions(),
            reloads = self.reloads(),
            phase_retries = self.phase_retries(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_counters_increment() {
        let metrics = Metrics::new();
        metrics.inc_polls();
        metrics.inc_polls();
        metrics.inc_gating_actions();
        metrics.inc_reloads();
        metrics.inc_phase_retries();

        assert_eq!(metrics.polls(), 2);
        assert_eq!(metrics.gating_actions(), 1);
        assert_eq!(metrics.reloads(), 1);
        assert_eq!(metrics.phase_retries(), 1);
        metrics.flush();
    }
}

//! Structured lifecycle events for a pipeline-pilot invocation.
//!
//! This module provides:
//! - An invocation-scoped tracing span via the `RunSpan` RAII guard
//! - Emission functions for run, stage and retry lifecycle events
//!
//! Events are emitted at `info!` level (warnings for failed attempts).
//! Filtering is controlled through `PIPELINE_PILOT_LOG`.

use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{BadgeState, RunStatus};

/// RAII guard that keeps an invocation span entered for the lifetime of a run.
///
/// # Example
///
/// ```ignore
/// let span = RunSpan::enter("production", "ejar3-core-app");
/// // every event below is tagged with span.invocation_id()
/// ```
pub struct RunSpan {
    invocation_id: Uuid,
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    /// Create and enter a span tagged with a fresh invocation id.
    pub fn enter(branch: &str, service: &str) -> Self {
        let invocation_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "pilot.run",
            invocation_id = %invocation_id,
            branch = %branch,
            service = %service,
        );
        Self {
            invocation_id,
            _span: span.entered(),
        }
    }

    pub fn invocation_id(&self) -> Uuid {
        self.invocation_id
    }
}

/// Emit event: run requested.
pub fn emit_run_started(ticket: &str, script: &str, branch: &str) {
    info!(event = "run.started", ticket = %ticket, script = %script, branch = %branch);
}

/// Emit event: the pipeline identifier was read from the run URL.
pub fn emit_pipeline_identified(pipeline_id: u64, url: &str) {
    info!(event = "run.identified", pipeline_id = pipeline_id, url = %url);
}

/// Emit event: a stage watcher started.
pub fn emit_stage_started(stage: &str, max_attempts: u32) {
    info!(event = "stage.started", stage = %stage, max_attempts = max_attempts);
}

/// Emit event: a stage watcher reached a verdict.
pub fn emit_stage_finished(stage: &str, state: BadgeState, attempts: u32, actions: u32) {
    info!(
        event = "stage.finished",
        stage = %stage,
        state = %state,
        attempts = attempts,
        actions = actions,
    );
}

/// Emit event: one attempt of a phase or poll loop failed (warning level).
pub fn emit_attempt_failed(phase: &str, attempt: u32, max_attempts: u32, error: &dyn std::fmt::Display) {
    warn!(
        event = "stage.attempt_failed",
        phase = %phase,
        attempt = attempt,
        max_attempts = max_attempts,
        error = %error,
    );
}

/// Emit event: run finished with its terminal status.
pub fn emit_run_finished(pipeline_id: Option<u64>, status: RunStatus, duration_ms: u64) {
    match pipeline_id {
        Some(id) => info!(
            event = "run.finished",
            pipeline_id = id,
            status = %status,
            duration_ms = duration_ms,
        ),
        None => info!(event = "run.finished", status = %status, duration_ms = duration_ms),
    }
}

/// Emit event: session teardown failed (warning level).
pub fn emit_teardown_error(error: &dyn std::fmt::Display) {
    warn!(event = "driver.teardown_error", error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_span_ids_are_unique() {
        let first = RunSpan::enter("production", "ejar3-sec");
        let first_id = first.invocation_id();
        drop(first);
        let second = RunSpan::enter("production", "ejar3-sec");
        assert_ne!(first_id, second.invocation_id());
    }
}

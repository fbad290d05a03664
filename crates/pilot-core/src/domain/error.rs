//! Error taxonomy for Pipeline Pilot.

use std::path::PathBuf;

use super::badge::BadgeState;

/// Errors produced while configuring or driving a pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum PilotError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid branch '{0}': expected one of development, production, test, uat")]
    InvalidBranch(String),

    #[error("failed to read script {path}: {source}")]
    ScriptRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("element not found: {locator} (waited {waited_ms}ms)")]
    ElementNotFound { locator: String, waited_ms: u64 },

    #[error("transient UI error: {0}")]
    TransientUi(String),

    #[error("setup error: {0}")]
    Setup(String),

    #[error("stage '{stage}' failed (badge state: {state})")]
    StageFailed { stage: String, state: BadgeState },

    #[error("stage '{stage}' timed out after {attempts} attempt(s)")]
    StageTimeout { stage: String, attempts: u32 },

    #[error("stage '{entering}' entered out of order: {reason}")]
    StageOrder { entering: String, reason: String },

    #[error("invalid run transition: {0}")]
    InvalidTransition(String),

    #[error("driver error: {0}")]
    Driver(String),
}

impl PilotError {
    /// Whether a whole-phase retry may clear this error.
    ///
    /// Only UI-level hiccups qualify. Terminal stage verdicts, configuration
    /// problems and broken sessions are surfaced immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PilotError::ElementNotFound { .. } | PilotError::TransientUi(_) | PilotError::Setup(_)
        )
    }

    /// Whether this error was caused by invalid input or configuration.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            PilotError::Configuration(_) | PilotError::InvalidBranch(_)
        )
    }
}

/// Result type for Pipeline Pilot operations.
pub type Result<T> = std::result::Result<T, PilotError>;

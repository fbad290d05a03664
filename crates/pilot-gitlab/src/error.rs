//! Error types for pilot-gitlab

use thiserror::Error;

/// Errors returned by the GitLab client
#[derive(Error, Debug)]
pub enum GitLabError {
    /// Missing or invalid client settings
    #[error("GitLab is not configured: {0}")]
    NotConfigured(String),

    /// Resource does not exist (or is invisible to the token)
    #[error("{0} not found")]
    NotFound(String),

    /// Token rejected
    #[error("GitLab rejected the access token (HTTP {0})")]
    Unauthorized(u16),

    /// Any other non-success status
    #[error("GitLab API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Transport or decoding failure
    #[error("HTTP error: {0}")]
    Http(String),
}

impl From<reqwest::Error> for GitLabError {
    fn from(err: reqwest::Error) -> Self {
        GitLabError::Http(err.to_string())
    }
}

/// Result type for GitLab operations
pub type Result<T> = std::result::Result<T, GitLabError>;

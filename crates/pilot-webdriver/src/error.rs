//! Error types for pilot-webdriver

use pilot_core::PilotError;
use serde::Deserialize;
use thiserror::Error;

/// W3C error codes a later attempt may clear.
const TRANSIENT_CODES: &[&str] = &[
    "no such element",
    "stale element reference",
    "element not interactable",
    "element click intercepted",
    "timeout",
    "script timeout",
];

/// Errors that can occur while talking to a WebDriver server
#[derive(Error, Debug)]
pub enum WebDriverError {
    /// Server answered with a W3C error payload
    #[error("webdriver error '{code}' (HTTP {status}): {message}")]
    Protocol {
        status: u16,
        code: String,
        message: String,
    },

    /// No browser session could be created
    #[error("session not created: {0}")]
    SessionNotCreated(String),

    /// Command did not complete within the HTTP timeout
    #[error("webdriver command timed out: {0}")]
    Timeout(String),

    /// Transport failure
    #[error("HTTP error: {0}")]
    Http(String),

    /// Response did not have the expected shape
    #[error("unexpected webdriver response: {0}")]
    UnexpectedResponse(String),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

/// `value` of a failed command.
#[derive(Debug, Deserialize)]
pub(crate) struct WireError {
    pub error: String,
    #[serde(default)]
    pub message: String,
}

impl WebDriverError {
    pub(crate) fn from_wire(status: u16, value: &serde_json::Value) -> Self {
        match serde_json::from_value::<WireError>(value.clone()) {
            Ok(wire) => WebDriverError::Protocol {
                status,
                code: wire.error,
                message: wire.message,
            },
            Err(_) => WebDriverError::UnexpectedResponse(format!("HTTP {}: {}", status, value)),
        }
    }

    /// Whether retrying the same command later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            WebDriverError::Protocol { code, .. } => TRANSIENT_CODES.contains(&code.as_str()),
            WebDriverError::Timeout(_) => true,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for WebDriverError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            WebDriverError::Timeout(err.to_string())
        } else {
            WebDriverError::Http(err.to_string())
        }
    }
}

impl From<WebDriverError> for PilotError {
    fn from(err: WebDriverError) -> Self {
        if err.is_transient() {
            PilotError::TransientUi(err.to_string())
        } else {
            PilotError::Driver(err.to_string())
        }
    }
}

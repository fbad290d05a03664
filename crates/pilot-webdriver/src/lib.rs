//! Pilot-WebDriver: browser automation backend for Pipeline Pilot
//!
//! Implements [`pilot_core::UiDriver`] over the W3C WebDriver HTTP protocol.
//! The default setup attaches to a Chrome instance started with
//! `--remote-debugging-port=9222` through chromedriver, and launches Firefox
//! when that is not possible.

pub mod error;
pub mod session;

pub use error::WebDriverError;
pub use session::{capabilities, element_ids, poll_attempts, WebDriverSession, ELEMENT_KEY};

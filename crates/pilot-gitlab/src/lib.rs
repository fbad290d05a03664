//! Pilot-GitLab: read pipeline results back from the GitLab API
//!
//! Used after a run to show the pipeline, its jobs and the output the script
//! printed between its OUTPUT CONTENT markers.

pub mod client;
pub mod error;
pub mod model;

pub use client::{GitLabClient, GitLabConfig, PER_PAGE};
pub use error::{GitLabError, Result};
pub use model::{extract_output_content, Job, Pipeline, User, NO_OUTPUT_SECTION};

/// Job that runs the submitted script.
pub const DEFAULT_JOB: &str = "runscript_prod";

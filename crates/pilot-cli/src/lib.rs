//! Shared pieces of the `pipeline-pilot` and `pipeline-fetch` binaries.

pub mod fetch;
pub mod report;

//! API payloads and trace parsing.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Printed when a trace has no output section.
pub const NO_OUTPUT_SECTION: &str = "No OUTPUT CONTENT section found";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: u64,
    pub status: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub web_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: u64,
    pub name: String,
    pub stage: String,
    pub status: String,
}

fn output_section() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?s)---------------------OUTPUT CONTENT----------------------------\n(.*?)\n---------------------END OF OUTPUT-----------------------------",
        )
        .unwrap_or_else(|e| unreachable!("output section pattern is valid: {e}"))
    })
}

/// Text between the script's OUTPUT CONTENT markers, trimmed.
pub fn extract_output_content(trace: &str) -> Option<&str> {
    output_section()
        .captures(trace)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_output_content() {
        let trace = "Running with gitlab-runner 16.9\n$ bundle exec rake ops:fix_eligibility\n---------------------OUTPUT CONTENT----------------------------\n  updated 12 contracts\nskipped 3\n---------------------END OF OUTPUT-----------------------------\nJob succeeded\n";
        assert_eq!(
            extract_output_content(trace),
            Some("updated 12 contracts\nskipped 3")
        );
    }

    #[test]
    fn test_missing_output_section() {
        assert_eq!(extract_output_content("Job succeeded"), None);
        assert_eq!(
            extract_output_content("---------------------OUTPUT CONTENT----------------------------\nno end"),
            None
        );
    }

    #[test]
    fn test_pipeline_payload() {
        let raw = r#"{
            "id": 48213,
            "iid": 311,
            "status": "success",
            "ref": "production",
            "sha": "a91957a858320c0e17f3a0eca7cfacbff50ea29a",
            "created_at": "2026-03-02T09:14:07.512Z",
            "user": {"id": 7, "name": "Ops Bot", "username": "ops-bot"},
            "web_url": "https://gitlab.example.com/ejar3/devs/tool/-/pipelines/48213"
        }"#;
        let pipeline: Pipeline = serde_json::from_str(raw).unwrap();
        assert_eq!(pipeline.id, 48213);
        assert_eq!(pipeline.git_ref, "production");
        assert_eq!(pipeline.user.unwrap().name, "Ops Bot");
    }

    #[test]
    fn test_job_payload() {
        let raw = r#"[{"id": 9001, "name": "runscript_prod", "stage": "execute", "status": "success", "tag": false}]"#;
        let jobs: Vec<Job> = serde_json::from_str(raw).unwrap();
        assert_eq!(jobs[0].name, "runscript_prod");
    }
}

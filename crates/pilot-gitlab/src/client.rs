//! GitLab REST API client
//!
//! Read-only access to a project's pipelines, their jobs and job traces,
//! authenticated with a personal or project access token.

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{GitLabError, Result};
use crate::model::{Job, Pipeline};

/// Page size used when listing jobs.
pub const PER_PAGE: usize = 100;

/// GitLab connection settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitLabConfig {
    /// Instance URL, e.g. `https://gitlab.example.com`
    pub base_url: String,
    /// Access token sent as `PRIVATE-TOKEN`
    pub token: String,
    /// Numeric id or `group/project` path
    pub project_id: String,
}

impl GitLabConfig {
    pub fn new(base_url: &str, token: &str, project_id: &str) -> Self {
        GitLabConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            project_id: project_id.to_string(),
        }
    }

    /// Read `GITLAB_BASE_URL`, `GITLAB_ACCESS_TOKEN` and `GITLAB_PROJECT_ID`
    /// (or `PROJECT_ID`) from the environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| GitLabError::NotConfigured(format!("{} is not set", key)))
        };

        let base_url = required("GITLAB_BASE_URL")?;
        let token = required("GITLAB_ACCESS_TOKEN")?;
        let project_id = required("GITLAB_PROJECT_ID").or_else(|_| required("PROJECT_ID"))?;
        Ok(Self::new(&base_url, &token, &project_id))
    }
}

/// Client for one GitLab project
pub struct GitLabClient {
    config: GitLabConfig,
    http: reqwest::Client,
}

impl GitLabClient {
    pub fn new(config: GitLabConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("pipeline-pilot/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(GitLabClient { config, http })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(GitLabConfig::from_env()?)
    }

    /// Absolute URL of a project-scoped API path.
    pub fn project_url(&self, path: &str) -> String {
        format!(
            "{}/api/v4/projects/{}{}",
            self.config.base_url,
            self.config.project_id.replace('/', "%2F"),
            path
        )
    }

    async fn get(&self, url: &str, what: &str) -> Result<reqwest::Response> {
        debug!(url = %url, "GitLab request");
        let response = self
            .http
            .get(url)
            .header("PRIVATE-TOKEN", &self.config.token)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(GitLabError::NotFound(what.to_string())),
            status @ (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => {
                Err(GitLabError::Unauthorized(status.as_u16()))
            }
            status => Err(GitLabError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, what: &str) -> Result<T> {
        Ok(self.get(url, what).await?.json().await?)
    }

    /// `GET /projects/:id/pipelines/:pipeline_id`
    pub async fn pipeline(&self, pipeline_id: u64) -> Result<Pipeline> {
        let url = self.project_url(&format!("/pipelines/{}", pipeline_id));
        self.get_json(&url, &format!("pipeline {}", pipeline_id)).await
    }

    /// All jobs of a pipeline, following pagination.
    pub async fn pipeline_jobs(&self, pipeline_id: u64) -> Result<Vec<Job>> {
        let mut jobs = Vec::new();
        let mut page = 1;
        loop {
            let url = self.project_url(&format!(
                "/pipelines/{}/jobs?per_page={}&page={}",
                pipeline_id, PER_PAGE, page
            ));
            let batch: Vec<Job> = self
                .get_json(&url, &format!("jobs of pipeline {}", pipeline_id))
                .await?;
            let last_page = batch.len() < PER_PAGE;
            jobs.extend(batch);
            if last_page {
                break;
            }
            page += 1;
        }
        Ok(jobs)
    }

    /// Raw log of a job.
    pub async fn job_trace(&self, job_id: u64) -> Result<String> {
        let url = self.project_url(&format!("/jobs/{}/trace", job_id));
        Ok(self.get(&url, &format!("trace of job {}", job_id)).await?.text().await?)
    }
}

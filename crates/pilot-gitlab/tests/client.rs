//! `GitLabClient` against a mock GitLab API.

use pilot_gitlab::{GitLabClient, GitLabConfig, GitLabError, PER_PAGE};
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "glpat-test";

fn client(server: &MockServer) -> GitLabClient {
    GitLabClient::new(GitLabConfig::new(&server.uri(), TOKEN, "42")).unwrap()
}

fn jobs(first_id: u64, count: usize) -> Value {
    let items: Vec<Value> = (0..count as u64)
        .map(|i| {
            json!({
                "id": first_id + i,
                "name": format!("job_{}", first_id + i),
                "stage": "execute",
                "status": "success",
                "web_url": "https://gitlab.example.com/jobs/1"
            })
        })
        .collect();
    Value::Array(items)
}

#[tokio::test]
async fn test_pipeline_jobs_follows_pages() {
    let server = MockServer::start().await;
    let per_page = PER_PAGE.to_string();
    Mock::given(method("GET"))
        .and(path("/api/v4/projects/42/pipelines/48213/jobs"))
        .and(query_param("per_page", per_page.as_str()))
        .and(query_param("page", "1"))
        .and(header("PRIVATE-TOKEN", TOKEN))
        .respond_with(ResponseTemplate::new(200).set_body_json(jobs(1, PER_PAGE)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v4/projects/42/pipelines/48213/jobs"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jobs(1_001, 2)))
        .expect(1)
        .mount(&server)
        .await;

    let all = client(&server).pipeline_jobs(48213).await.unwrap();

    assert_eq!(all.len(), PER_PAGE + 2);
    assert_eq!(all[0].id, 1);
    assert_eq!(all.last().map(|j| j.name.as_str()), Some("job_1002"));
}

#[tokio::test]
async fn test_short_first_page_stops_paging() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v4/projects/42/pipelines/7/jobs"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jobs(1, 3)))
        .expect(1)
        .mount(&server)
        .await;

    let all = client(&server).pipeline_jobs(7).await.unwrap();
    assert_eq!(all.len(), 3);
}

#[tokio::test]
async fn test_pipeline_and_trace() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v4/projects/42/pipelines/48213"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 48213,
            "status": "success",
            "ref": "production",
            "created_at": "2026-03-02T09:14:07.120Z",
            "user": { "name": "Ops Bot", "username": "ops-bot" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v4/projects/42/jobs/9001/trace"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Running with gitlab-runner\n12 rows fixed\n"))
        .mount(&server)
        .await;

    let client = client(&server);
    let pipeline = client.pipeline(48213).await.unwrap();
    assert_eq!(pipeline.git_ref, "production");
    assert_eq!(pipeline.user.map(|u| u.name), Some("Ops Bot".to_string()));
    assert_eq!(pipeline.web_url, None);

    let trace = client.job_trace(9001).await.unwrap();
    assert!(trace.contains("12 rows fixed"));
}

#[tokio::test]
async fn test_status_mapping() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v4/projects/42/pipelines/1"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v4/projects/42/pipelines/2"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v4/projects/42/pipelines/3"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let client = client(&server);
    assert!(matches!(client.pipeline(1).await, Err(GitLabError::NotFound(_))));
    assert!(matches!(client.pipeline(2).await, Err(GitLabError::Unauthorized(401))));
    match client.pipeline(3).await {
        Err(GitLabError::Status { status, body }) => {
            assert_eq!(status, 502);
            assert_eq!(body, "bad gateway");
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

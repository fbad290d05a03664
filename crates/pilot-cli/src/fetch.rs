//! Printing pipeline results fetched from the GitLab API.

use anyhow::{Context, Result};
use pilot_gitlab::{extract_output_content, GitLabClient, Job, Pipeline, NO_OUTPUT_SECTION};

/// Pipeline header and job table.
pub fn render_pipeline(pipeline: &Pipeline, jobs: &[Job]) -> String {
    let user = pipeline
        .user
        .as_ref()
        .map(|u| u.name.as_str())
        .unwrap_or("N/A");

    let mut out = String::new();
    out.push_str(&format!("\nPipeline ID: {}\n", pipeline.id));
    out.push_str(&format!("Status: {}\n", pipeline.status));
    out.push_str(&format!("Ref: {}\n", pipeline.git_ref));
    out.push_str(&format!("Created: {}\n", pipeline.created_at.to_rfc3339()));
    out.push_str(&format!("User: {}\n", user));
    out.push_str(&format!("\nJobs ({}):\n", jobs.len()));
    out.push_str(&format!("{}\n", "-".repeat(40)));
    for job in jobs {
        out.push_str(&format!("{} | {} | {}\n", job.name, job.stage, job.status));
    }
    out
}

/// One job's log, or only its OUTPUT CONTENT section.
pub fn render_job_output(job: &Job, trace: &str, output_only: bool) -> String {
    let body = if trace.is_empty() {
        "No output available"
    } else if output_only {
        extract_output_content(trace).unwrap_or(NO_OUTPUT_SECTION)
    } else {
        trace
    };
    format!(
        "{}\n{}\n{}\n",
        job_header(job),
        body.trim_end(),
        "-".repeat(50)
    )
}

fn job_header(job: &Job) -> String {
    format!("\nJob: {} [{}] - {}\n{}", job.name, job.stage, job.status, "-".repeat(50))
}

/// Print the pipeline, its jobs and the output of every job named `job_name`.
pub async fn print_report(
    client: &GitLabClient,
    pipeline_id: u64,
    job_name: &str,
    output_only: bool,
) -> Result<()> {
    let pipeline = client
        .pipeline(pipeline_id)
        .await
        .with_context(|| format!("Failed to fetch pipeline {}", pipeline_id))?;
    let jobs = client
        .pipeline_jobs(pipeline_id)
        .await
        .with_context(|| format!("Failed to list jobs of pipeline {}", pipeline_id))?;
    print!("{}", render_pipeline(&pipeline, &jobs));

    let title = if output_only {
        "Script Output Content"
    } else {
        "Full Script Output"
    };
    println!("\n{} for Pipeline {}", title, pipeline_id);
    println!("{}", "=".repeat(60));

    for job in jobs.iter().filter(|j| j.name == job_name) {
        match client.job_trace(job.id).await {
            Ok(trace) => print!("{}", render_job_output(job, &trace, output_only)),
            Err(err) => {
                println!("{}", job_header(job));
                println!("Could not retrieve output: {}", err);
                println!("{}", "-".repeat(50));
            }
        }
    }
    Ok(())
}

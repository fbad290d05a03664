//! pipeline-fetch - show a pipeline and its script output
//!
//! ```text
//! pipeline-fetch --pipeline-id 48213                # full job log
//! pipeline-fetch --pipeline-id 48213 --output-only  # OUTPUT CONTENT section only
//! ```
//!
//! Reads `GITLAB_BASE_URL`, `GITLAB_ACCESS_TOKEN` and `GITLAB_PROJECT_ID`.

use anyhow::{Context, Result};
use clap::Parser;
use pilot_gitlab::{GitLabClient, DEFAULT_JOB};
use tracing::Level;

#[derive(Parser)]
#[command(name = "pipeline-fetch")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Fetch a GitLab pipeline and its script output", long_about = None)]
struct Cli {
    /// Pipeline ID
    #[arg(long)]
    pipeline_id: u64,

    /// Print only the OUTPUT CONTENT section of the job log
    #[arg(long)]
    output_only: bool,

    /// Job whose log is printed
    #[arg(long, default_value = DEFAULT_JOB)]
    job: String,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    pilot_core::init_tracing(cli.json, level);

    let client = GitLabClient::from_env().context("GitLab API access is not configured")?;
    pilot_cli::fetch::print_report(&client, cli.pipeline_id, &cli.job, cli.output_only).await
}

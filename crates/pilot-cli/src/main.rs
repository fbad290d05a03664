//! Pipeline Pilot - unattended run-script pipeline driver
//!
//! Opens the pipeline form in a browser, fills the CI variables, triggers the
//! run and follows it through the request, approve and execute stages.
//!
//! ```text
//! pipeline-pilot -t ES-100 -s fix_eligibility -e ejar3-sec -b production
//! ```
//!
//! Exits 0 when the script job passed, 1 otherwise.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use pilot_core::obs::RunSpan;
use pilot_core::{PilotConfig, PipelineOrchestrator, RunRequest, ScriptStore};
use pilot_gitlab::{GitLabClient, DEFAULT_JOB};
use pilot_webdriver::WebDriverSession;
use tracing::{error, info, warn, Level};

use pilot_cli::fetch;
use pilot_cli::report;

#[derive(Parser)]
#[command(name = "pipeline-pilot")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run a script through the GitLab run-script pipeline", long_about = None)]
struct Cli {
    /// Ticket description, e.g. ES-100
    #[arg(short, long)]
    ticket: String,

    /// Script name (without extension) in the scripts directory
    #[arg(short, long)]
    script: String,

    /// Target service, e.g. ejar3-core-app
    #[arg(short = 'e', long = "ejar-service")]
    ejar_service: String,

    /// Branch to run on: development, production, test or uat
    #[arg(short, long, default_value = "production")]
    branch: String,

    /// TOML configuration file (default: $PIPELINE_PILOT_CONFIG or built-in)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Do not wait for the request stage
    #[arg(long)]
    skip_request: bool,

    /// Print the job's OUTPUT CONTENT section after a passed run
    #[arg(long)]
    fetch_output: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    pilot_core::init_tracing(cli.json, level);

    let span = RunSpan::enter(&cli.branch, &cli.ejar_service);
    info!(invocation_id = %span.invocation_id(), "Pipeline Pilot {}", pilot_core::VERSION);

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            error!(error = %format!("{:#}", err), "Pipeline run failed");
            eprintln!("Error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<bool> {
    let config = PilotConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let scripts = ScriptStore::from_settings(&config.scripts);

    // Cheap checks first, so a typo never opens a browser.
    let prepared = RunRequest {
        ticket: cli.ticket,
        script_name: cli.script,
        service: cli.ejar_service,
        branch: cli.branch,
        skip_request: cli.skip_request,
    }
    .prepare(&scripts)?;

    let session = WebDriverSession::connect(&config.webdriver)
        .await
        .with_context(|| format!("Failed to open a browser session via {}", config.webdriver.server_url))?;

    let run = PipelineOrchestrator::new(session, config, scripts)
        .execute(prepared)
        .await?;

    print!("{}", report::render_run(&run));

    if cli.fetch_output && report::succeeded(&run) {
        if let Some(pipeline_id) = run.pipeline_id {
            if let Err(err) = print_output(pipeline_id).await {
                warn!(error = %format!("{:#}", err), "Could not fetch job output");
            }
        }
    }

    Ok(report::succeeded(&run))
}

async fn print_output(pipeline_id: u64) -> Result<()> {
    let client = GitLabClient::from_env().context("GitLab API access is not configured")?;
    fetch::print_report(&client, pipeline_id, DEFAULT_JOB, true).await
}

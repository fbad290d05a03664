//! End-to-end sequencing of one pipeline run.
//!
//! ```text
//! validate -> configure (navigate, branch, variables, trigger)
//!          -> run URL -> [request] -> approve -> execute
//! ```
//!
//! The orchestrator owns the driver for the whole run and closes it on every
//! exit path. Nothing touches the UI before the request has been prepared
//! (validated, script read).

use std::sync::OnceLock;

use regex::Regex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::PilotConfig;
use crate::domain::{Branch, PilotError, PipelineRun, PipelineStage, Result, RunStatus};
use crate::driver::{Locator, UiDriver};
use crate::injector::{Injected, VariableInjector};
use crate::metrics::METRICS;
use crate::obs;
use crate::resolver::{DescriptionSource, TicketDescriptionResolver};
use crate::retry::retry_with_policy;
use crate::script::ScriptStore;
use crate::watcher::{poll_until, WatchReport, WatchSpec};

fn run_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"/pipelines/(\d+)/?$")
            .unwrap_or_else(|e| unreachable!("run URL pattern is valid: {e}"))
    })
}

/// Numeric pipeline id from a run URL, ignoring query and fragment.
pub fn extract_pipeline_id(url: &str) -> Option<u64> {
    let path = url.split(&['?', '#'][..]).next().unwrap_or(url);
    run_url_pattern()
        .captures(path)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// What the operator asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub ticket: String,
    pub script_name: String,
    pub service: String,
    /// Raw branch name, validated before any UI interaction.
    pub branch: String,
    /// Do not watch the request stage even if enabled in config.
    pub skip_request: bool,
}

impl RunRequest {
    /// Check the parameters and parse the branch.
    pub fn validate(&self) -> Result<Branch> {
        let required = [
            ("ticket", &self.ticket),
            ("script", &self.script_name),
            ("ejar-service", &self.service),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(PilotError::Configuration(format!(
                    "missing required parameter --{}",
                    name
                )));
            }
        }
        self.branch.parse()
    }

    /// Validate the request and read its script, without touching the UI.
    pub fn prepare(self, scripts: &ScriptStore) -> Result<PreparedRun> {
        let branch = self.validate()?;
        let script = scripts.read(&self.script_name)?;
        Ok(PreparedRun {
            request: self,
            branch,
            script,
        })
    }
}

/// A validated request with its script body loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedRun {
    pub request: RunRequest,
    pub branch: Branch,
    pub script: String,
}

/// Drives a single pipeline run through a [`UiDriver`].
pub struct PipelineOrchestrator<D: UiDriver> {
    driver: D,
    config: PilotConfig,
    scripts: ScriptStore,
    resolver: TicketDescriptionResolver,
    injector: VariableInjector,
}

impl<D: UiDriver> PipelineOrchestrator<D> {
    pub fn new(driver: D, config: PilotConfig, scripts: ScriptStore) -> Self {
        let resolver = TicketDescriptionResolver::new(&config.services.sensitive_markers);
        let injector = VariableInjector::new(&config);
        Self {
            driver,
            config,
            scripts,
            resolver,
            injector,
        }
    }

    /// Prepare `request` and run it, releasing the driver on every path.
    ///
    /// Stage failures and timeouts are reported through the returned run's
    /// status. Validation, configuration and driver errors are returned as
    /// errors.
    pub async fn run(self, request: RunRequest) -> Result<PipelineRun> {
        let started = Instant::now();
        let outcome = match request.prepare(&self.scripts) {
            Ok(prepared) => self.drive(&prepared).await,
            Err(err) => Err(err),
        };
        self.conclude(started, outcome).await
    }

    /// Run an already prepared request.
    pub async fn execute(self, prepared: PreparedRun) -> Result<PipelineRun> {
        let started = Instant::now();
        let outcome = self.drive(&prepared).await;
        self.conclude(started, outcome).await
    }

    async fn conclude(&self, started: Instant, outcome: Result<PipelineRun>) -> Result<PipelineRun> {
        if let Err(err) = self.driver.close().await {
            obs::emit_teardown_error(&err);
        }

        match &outcome {
            Ok(run) => obs::emit_run_finished(run.pipeline_id, run.status, elapsed_ms(started)),
            Err(err) => warn!(error = %err, "Run aborted"),
        }
        METRICS.flush();
        outcome
    }

    async fn drive(&self, prepared: &PreparedRun) -> Result<PipelineRun> {
        let request = &prepared.request;
        let branch = prepared.branch;
        let script = &prepared.script;
        obs::emit_run_started(&request.ticket, &request.script_name, branch.as_str());

        let resolved = self.resolver.resolve(&request.ticket, script, &request.service);
        match resolved.source {
            DescriptionSource::ScriptTask => info!(
                ticket = %request.ticket,
                description = %resolved.value,
                "Sensitive service, using task name from script as description"
            ),
            DescriptionSource::ExtractionMissing => warn!(
                service = %request.service,
                ticket = %request.ticket,
                "Sensitive service but no task declaration found in script, keeping ticket"
            ),
            DescriptionSource::Ticket => {}
        }

        let this = self;
        let description = resolved.value.as_str();
        let service = request.service.as_str();
        let script_body = script.as_str();
        let injected = retry_with_policy(
            PipelineStage::Configure.as_str(),
            &self.config.retry.configure,
            move |attempt| this.configure(attempt, branch, description, service, script_body),
        )
        .await?;

        let mut run = PipelineRun::triggered(branch, injected.variables);

        let (pipeline_id, url) =
            match retry_with_policy("run_url", &self.config.retry.run_url, move |_| this.pipeline_url()).await {
                Ok(found) => found,
                Err(err) if err.is_retryable() => {
                    warn!(error = %err, "Pipeline page never loaded after trigger");
                    run.finish(RunStatus::TimedOut, Some(err.to_string()))?;
                    return Ok(run);
                }
                Err(err) => return Err(err),
            };
        run.pipeline_id = Some(pipeline_id);
        obs::emit_pipeline_identified(pipeline_id, &url);

        for spec in self.stage_specs(request) {
            run.enter_stage(spec.stage)?;
            let spec = &spec;
            let watched = retry_with_policy(spec.stage.as_str(), &self.config.retry.stage, move |_| {
                this.watch(spec)
            })
            .await;

            match watched {
                Ok(report) => run.record_stage(report.record())?,
                Err(err @ PilotError::StageFailed { .. }) => {
                    run.finish(RunStatus::Failed, Some(err.to_string()))?;
                    return Ok(run);
                }
                Err(err @ PilotError::StageTimeout { .. }) => {
                    run.finish(RunStatus::TimedOut, Some(err.to_string()))?;
                    return Ok(run);
                }
                Err(err) => return Err(err),
            }
        }

        run.finish(RunStatus::Passed, None)?;
        Ok(run)
    }

    /// One attempt at navigate, branch selection, variables and trigger.
    async fn configure(
        &self,
        attempt: u32,
        branch: Branch,
        description: &str,
        service: &str,
        script: &str,
    ) -> Result<Injected> {
        let settings = &self.config.pipeline;
        debug!(attempt, url = %settings.new_pipeline_url, "Opening pipeline form");

        self.driver.navigate(&settings.new_pipeline_url).await?;
        self.driver
            .wait_for_element(&Locator::css(&self.config.selectors.page_ready), settings.page_ready_timeout())
            .await?;
        self.select_branch(branch).await?;
        self.injector.inject(&self.driver, description, service, script).await
    }

    async fn select_branch(&self, branch: Branch) -> Result<()> {
        let settings = &self.config.pipeline;
        let selectors = &self.config.selectors;

        self.driver.click(&Locator::css(&selectors.branch_dropdown)).await?;
        tokio::time::sleep(settings.dropdown_settle()).await;

        let options = Locator::css(&selectors.branch_options);
        self.driver
            .wait_for_element(&options, settings.page_ready_timeout())
            .await?;
        let total = self.driver.count(&options).await?;

        let index = match self.find_branch_option(&options, total, branch).await? {
            Some(index) => index,
            None => {
                let index = self.config.branches.index(branch);
                if index >= total {
                    return Err(PilotError::TransientUi(format!(
                        "no ref option named '{}' and fallback option {} not rendered ({} options)",
                        branch, index, total
                    )));
                }
                warn!(
                    degraded = true,
                    branch = %branch,
                    fallback_index = index,
                    "No ref option carries the branch name, selecting by position"
                );
                index
            }
        };

        self.driver.click(&options.nth(index)).await?;
        tokio::time::sleep(settings.selection_settle()).await;
        info!(branch = %branch, index, "Branch selected");
        Ok(())
    }

    /// Index of the ref option labelled with the branch name.
    async fn find_branch_option(&self, options: &Locator, total: usize, branch: Branch) -> Result<Option<usize>> {
        let attribute = &self.config.branches.label_attribute;
        for index in 0..total {
            let label = self
                .driver
                .read_attribute(&options.clone().nth(index), attribute)
                .await?;
            if label.is_some_and(|l| l.trim().eq_ignore_ascii_case(branch.as_str())) {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    /// Current URL and its pipeline id, once the run page has loaded.
    async fn pipeline_url(&self) -> Result<(u64, String)> {
        let url = self.driver.current_url().await?;
        match extract_pipeline_id(&url) {
            Some(id) => Ok((id, url)),
            None => Err(PilotError::TransientUi(format!(
                "run page not reached yet (at {})",
                url
            ))),
        }
    }

    fn stage_specs(&self, request: &RunRequest) -> Vec<WatchSpec> {
        let mut specs = Vec::with_capacity(3);
        if self.config.stages.request_enabled && !request.skip_request {
            specs.push(WatchSpec::request(&self.config));
        } else {
            debug!("Request stage skipped");
        }
        specs.push(WatchSpec::approve(&self.config));
        specs.push(WatchSpec::execute(&self.config));
        specs
    }

    async fn watch(&self, spec: &WatchSpec) -> Result<WatchReport> {
        if spec.stage == PipelineStage::Execute {
            let job = Locator::css(&self.config.selectors.job_badge);
            self.driver.wait_for_element(&job, spec.badge_wait).await?;
            self.driver.click(&job).await?;
            debug!(job = %job, "Job view opened");
            tokio::time::sleep(self.config.stages.job_open_wait()).await;
        }
        poll_until(&self.driver, spec).await
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

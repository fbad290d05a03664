//! Declarative configuration: URLs, selectors, option mappings and policies.
//!
//! Everything environment specific (DOM selectors, dropdown positions,
//! attempt bounds) lives here instead of in code. A config is loaded from
//! TOML, patched from environment variables and validated once at startup.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::{Branch, PilotError, Result};
use crate::retry::RetryPolicy;

/// Path of the TOML config file when `--config` is not given.
pub const CONFIG_ENV: &str = "PIPELINE_PILOT_CONFIG";
/// Overrides [`ScriptSettings::dir`].
pub const SCRIPTS_DIR_ENV: &str = "PIPELINE_PILOT_SCRIPTS_DIR";
/// Overrides [`WebDriverSettings::server_url`].
pub const WEBDRIVER_URL_ENV: &str = "PIPELINE_PILOT_WEBDRIVER_URL";

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PilotConfig {
    pub pipeline: PipelineSettings,
    pub selectors: SelectorMap,
    pub branches: BranchOptions,
    pub services: ServiceSettings,
    pub stages: StageSettings,
    pub retry: PhaseRetrySettings,
    pub scripts: ScriptSettings,
    pub webdriver: WebDriverSettings,
}

/// Pipeline creation page and its timings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// URL of the "run pipeline" form.
    pub new_pipeline_url: String,
    /// Wait for the form to render (milliseconds).
    pub page_ready_timeout_ms: u64,
    /// Pause after opening a dropdown (milliseconds).
    pub dropdown_settle_ms: u64,
    /// Pause after choosing a dropdown option (milliseconds).
    pub selection_settle_ms: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            new_pipeline_url:
                "https://devops.housing.sa:8083/ejar3/devs/ejar3-run-script-tool/-/pipelines/new"
                    .to_string(),
            page_ready_timeout_ms: 10_000,
            dropdown_settle_ms: 1_000,
            selection_settle_ms: 2_000,
        }
    }
}

impl PipelineSettings {
    pub fn page_ready_timeout(&self) -> Duration {
        Duration::from_millis(self.page_ready_timeout_ms)
    }

    pub fn dropdown_settle(&self) -> Duration {
        Duration::from_millis(self.dropdown_settle_ms)
    }

    pub fn selection_settle(&self) -> Duration {
        Duration::from_millis(self.selection_settle_ms)
    }
}

/// CSS selectors for every element the pilot touches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorMap {
    pub page_ready: String,
    pub branch_dropdown: String,
    pub branch_options: String,
    pub variable_rows: String,
    pub value_field: String,
    pub value_dropdown: String,
    pub service_options: String,
    pub run_button: String,
    pub ci_icon: String,
    pub action_button: String,
    pub request_badge: String,
    pub request_badge_fallback: Option<String>,
    pub approve_badge: String,
    pub approve_badge_fallback: Option<String>,
    pub job_badge: String,
    pub job_status_icon: String,
}

impl Default for SelectorMap {
    fn default() -> Self {
        Self {
            page_ready: "fieldset".to_string(),
            branch_dropdown: ".ref-selector #dropdown-toggle-btn-34".to_string(),
            branch_options: "#base-dropdown-36 ul li".to_string(),
            variable_rows: r#"div[data-testid="ci-variable-row-container"]"#.to_string(),
            value_field: r#"[data-testid="pipeline-form-ci-variable-value-field"]"#.to_string(),
            value_dropdown: r#"[data-testid="pipeline-form-ci-variable-value-dropdown"]"#
                .to_string(),
            service_options: "#base-dropdown-59 #listbox-58 li".to_string(),
            run_button: r#"[data-testid="run-pipeline-button"]"#.to_string(),
            ci_icon: r#"[data-testid="ci-icon"]"#.to_string(),
            action_button: r#"[data-testid="ci-action-button"]"#.to_string(),
            request_badge: "#ci-badge-request_prod".to_string(),
            request_badge_fallback: Some(r#"[id*="ci-badge-request"]"#.to_string()),
            approve_badge: "#ci-badge-approve_prod".to_string(),
            approve_badge_fallback: Some(r#"[id*="ci-badge-approve"]"#.to_string()),
            job_badge: "#ci-badge-runscript_prod".to_string(),
            job_status_icon: r#".build-job a[data-testid="ci-icon"]"#.to_string(),
        }
    }
}

impl SelectorMap {
    fn named(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("page_ready", self.page_ready.as_str()),
            ("branch_dropdown", self.branch_dropdown.as_str()),
            ("branch_options", self.branch_options.as_str()),
            ("variable_rows", self.variable_rows.as_str()),
            ("value_field", self.value_field.as_str()),
            ("value_dropdown", self.value_dropdown.as_str()),
            ("service_options", self.service_options.as_str()),
            ("run_button", self.run_button.as_str()),
            ("ci_icon", self.ci_icon.as_str()),
            ("action_button", self.action_button.as_str()),
            ("request_badge", self.request_badge.as_str()),
            ("approve_badge", self.approve_badge.as_str()),
            ("job_badge", self.job_badge.as_str()),
            ("job_status_icon", self.job_status_icon.as_str()),
        ]
    }
}

/// How branches are picked in the ref-selector dropdown.
///
/// Options are matched by the label in `label_attribute`. The positions are
/// only used when no option carries the branch name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BranchOptions {
    /// Attribute carrying an option's ref name.
    pub label_attribute: String,
    pub development: usize,
    pub production: usize,
    pub test: usize,
    pub uat: usize,
}

impl Default for BranchOptions {
    fn default() -> Self {
        Self {
            label_attribute: "title".to_string(),
            development: 4,
            production: 5,
            test: 6,
            uat: 7,
        }
    }
}

impl BranchOptions {
    /// Fallback dropdown index for a branch.
    pub fn index(&self, branch: Branch) -> usize {
        match branch {
            Branch::Development => self.development,
            Branch::Production => self.production,
            Branch::Test => self.test,
            Branch::Uat => self.uat,
        }
    }
}

/// Service dropdown matching and the sensitive-service marker set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Case-insensitive substrings marking a sensitive service.
    pub sensitive_markers: Vec<String>,
    /// Attribute carrying an option's label.
    pub option_attribute: String,
    /// Prefix stripped from labels before display.
    pub option_label_prefix: String,
    /// Option clicked when no label matches. Degraded path.
    pub fallback_index: usize,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            sensitive_markers: vec!["sec".to_string(), "security-deposit".to_string()],
            option_attribute: "data-testid".to_string(),
            option_label_prefix: "listbox-item-".to_string(),
            fallback_index: 4,
        }
    }
}

/// Polling parameters of one stage watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageTuning {
    pub max_attempts: u32,
    /// Pause between polls (milliseconds).
    pub delay_ms: u64,
    /// Wait for the badge element on each poll (milliseconds).
    pub badge_wait_ms: u64,
    /// Pause after a gating action before re-reading (milliseconds).
    pub settle_ms: u64,
}

impl Default for StageTuning {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            delay_ms: 5_000,
            badge_wait_ms: 10_000,
            settle_ms: 0,
        }
    }
}

impl StageTuning {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            delay_ms: self.delay_ms,
        }
    }

    pub fn badge_wait(&self) -> Duration {
        Duration::from_millis(self.badge_wait_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

/// Per-stage watcher settings.
///
/// Partial stage tables are merged onto that stage's own defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StageSettingsPatch")]
pub struct StageSettings {
    /// Whether the optional request stage is watched.
    pub request_enabled: bool,
    pub request: StageTuning,
    pub approve: StageTuning,
    pub execute: StageTuning,
    /// Pause after opening the job view before watching it (milliseconds).
    pub job_open_wait_ms: u64,
}

impl Default for StageSettings {
    fn default() -> Self {
        Self {
            request_enabled: true,
            request: StageTuning {
                max_attempts: 10,
                delay_ms: 5_000,
                badge_wait_ms: 10_000,
                settle_ms: 0,
            },
            approve: StageTuning {
                max_attempts: 20,
                delay_ms: 5_000,
                badge_wait_ms: 20_000,
                settle_ms: 2_000,
            },
            execute: StageTuning {
                max_attempts: 60,
                delay_ms: 10_000,
                badge_wait_ms: 10_000,
                settle_ms: 0,
            },
            job_open_wait_ms: 15_000,
        }
    }
}

/// Keys present in a `[stages.*]` table.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StageTuningPatch {
    max_attempts: Option<u32>,
    delay_ms: Option<u64>,
    badge_wait_ms: Option<u64>,
    settle_ms: Option<u64>,
}

impl StageTuningPatch {
    fn over(self, base: StageTuning) -> StageTuning {
        StageTuning {
            max_attempts: self.max_attempts.unwrap_or(base.max_attempts),
            delay_ms: self.delay_ms.unwrap_or(base.delay_ms),
            badge_wait_ms: self.badge_wait_ms.unwrap_or(base.badge_wait_ms),
            settle_ms: self.settle_ms.unwrap_or(base.settle_ms),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StageSettingsPatch {
    request_enabled: Option<bool>,
    request: StageTuningPatch,
    approve: StageTuningPatch,
    execute: StageTuningPatch,
    job_open_wait_ms: Option<u64>,
}

impl From<StageSettingsPatch> for StageSettings {
    fn from(patch: StageSettingsPatch) -> Self {
        let base = StageSettings::default();
        Self {
            request_enabled: patch.request_enabled.unwrap_or(base.request_enabled),
            request: patch.request.over(base.request),
            approve: patch.approve.over(base.approve),
            execute: patch.execute.over(base.execute),
            job_open_wait_ms: patch.job_open_wait_ms.unwrap_or(base.job_open_wait_ms),
        }
    }
}

impl StageSettings {
    pub fn job_open_wait(&self) -> Duration {
        Duration::from_millis(self.job_open_wait_ms)
    }
}

/// Whole-phase retry policies applied by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "PhaseRetryPatch")]
pub struct PhaseRetrySettings {
    /// Navigate, select branch, inject variables and trigger.
    pub configure: RetryPolicy,
    /// Wrapper around each stage watcher.
    pub stage: RetryPolicy,
    /// Polling of the browser URL after triggering.
    pub run_url: RetryPolicy,
}

impl Default for PhaseRetrySettings {
    fn default() -> Self {
        Self {
            configure: RetryPolicy {
                max_attempts: 3,
                delay_ms: 3_000,
            },
            stage: RetryPolicy {
                max_attempts: 2,
                delay_ms: 5_000,
            },
            run_url: RetryPolicy {
                max_attempts: 30,
                delay_ms: 1_000,
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PolicyPatch {
    max_attempts: Option<u32>,
    delay_ms: Option<u64>,
}

impl PolicyPatch {
    fn over(self, base: RetryPolicy) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.unwrap_or(base.max_attempts),
            delay_ms: self.delay_ms.unwrap_or(base.delay_ms),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PhaseRetryPatch {
    configure: PolicyPatch,
    stage: PolicyPatch,
    run_url: PolicyPatch,
}

impl From<PhaseRetryPatch> for PhaseRetrySettings {
    fn from(patch: PhaseRetryPatch) -> Self {
        let base = PhaseRetrySettings::default();
        Self {
            configure: patch.configure.over(base.configure),
            stage: patch.stage.over(base.stage),
            run_url: patch.run_url.over(base.run_url),
        }
    }
}

/// Location of script files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptSettings {
    pub dir: PathBuf,
    /// File extension appended to the script name.
    pub extension: String,
}

impl Default for ScriptSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("scripts"),
            extension: "rb".to_string(),
        }
    }
}

/// WebDriver endpoint and browser capabilities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebDriverSettings {
    pub server_url: String,
    pub browser: String,
    /// Attach to an already running Chrome (`host:port`).
    pub debugger_address: Option<String>,
    /// Browser launched when the primary session cannot be created.
    pub fallback_browser: Option<String>,
    /// Interval between element lookups while waiting (milliseconds).
    pub element_poll_ms: u64,
    /// HTTP timeout of a single WebDriver command (seconds).
    pub command_timeout_secs: u64,
}

impl Default for WebDriverSettings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:9515".to_string(),
            browser: "chrome".to_string(),
            debugger_address: Some("127.0.0.1:9222".to_string()),
            fallback_browser: Some("firefox".to_string()),
            element_poll_ms: 250,
            command_timeout_secs: 60,
        }
    }
}

impl PilotConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| PilotError::Configuration(format!("invalid config: {}", e)))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PilotError::Configuration(format!("cannot read config {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Load from `path`, else from `PIPELINE_PILOT_CONFIG`, else defaults.
    /// Environment overrides are applied and the result is validated.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var(CONFIG_ENV).ok().map(PathBuf::from);

        let mut config = match path.map(Path::to_path_buf).or(env_path) {
            Some(p) => {
                info!(path = %p.display(), "Loading configuration");
                Self::from_file(&p)?
            }
            None => {
                debug!("No config file given, using built-in defaults");
                Self::default()
            }
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a key lookup (normally the process environment).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(SCRIPTS_DIR_ENV) {
            self.scripts.dir = PathBuf::from(dir);
        }
        if let Some(url) = lookup(WEBDRIVER_URL_ENV) {
            self.webdriver.server_url = url;
        }
    }

    /// Check the config is internally consistent.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(PilotError::Configuration(msg));

        if self.pipeline.new_pipeline_url.trim().is_empty() {
            return invalid("pipeline.new_pipeline_url must not be empty".to_string());
        }

        for (name, selector) in self.selectors.named() {
            if selector.trim().is_empty() {
                return invalid(format!("selectors.{} must not be empty", name));
            }
        }

        let mut seen = HashSet::new();
        for branch in Branch::ALL {
            let index = self.branches.index(branch);
            if !seen.insert(index) {
                return invalid(format!(
                    "branches.{} reuses dropdown index {}",
                    branch, index
                ));
            }
        }

        if self.branches.label_attribute.trim().is_empty() {
            return invalid("branches.label_attribute must not be empty".to_string());
        }

        if self.services.sensitive_markers.is_empty()
            || self
                .services
                .sensitive_markers
                .iter()
                .any(|m| m.trim().is_empty())
        {
            return invalid("services.sensitive_markers must contain non-empty markers".to_string());
        }
        if self.services.option_attribute.trim().is_empty() {
            return invalid("services.option_attribute must not be empty".to_string());
        }

        let policies = [
            ("stages.request", self.stages.request.max_attempts),
            ("stages.approve", self.stages.approve.max_attempts),
            ("stages.execute", self.stages.execute.max_attempts),
            ("retry.configure", self.retry.configure.max_attempts),
            ("retry.stage", self.retry.stage.max_attempts),
            ("retry.run_url", self.retry.run_url.max_attempts),
        ];
        for (name, max_attempts) in policies {
            if max_attempts == 0 {
                return invalid(format!("{}.max_attempts must be at least 1", name));
            }
        }

        if self.scripts.extension.trim().is_empty() {
            return invalid("scripts.extension must not be empty".to_string());
        }
        if self.webdriver.server_url.trim().is_empty() {
            return invalid("webdriver.server_url must not be empty".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = PilotConfig::default();
        config.validate().expect("defaults should validate");
        assert_eq!(config.branches.index(Branch::Production), 5);
        assert_eq!(config.services.fallback_index, 4);
        assert_eq!(config.stages.approve.max_attempts, 20);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let raw = r#"
            [branches]
            production = 2

            [stages.approve]
            max_attempts = 5
            delay_ms = 100

            [services]
            sensitive_markers = ["sec"]
        "#;
        let config = PilotConfig::from_toml_str(raw).unwrap();
        assert_eq!(config.branches.index(Branch::Production), 2);
        assert_eq!(config.branches.index(Branch::Uat), 7);
        assert_eq!(config.stages.approve.policy().max_attempts, 5);
        assert_eq!(config.stages.approve.delay_ms, 100);
        assert_eq!(config.stages.approve.settle_ms, 2_000);
        assert_eq!(config.stages.request.max_attempts, 10);
        assert_eq!(config.services.sensitive_markers, vec!["sec".to_string()]);
        assert_eq!(config.services.option_attribute, "data-testid");
        config.validate().unwrap();
    }

    #[test]
    fn test_single_key_tables_take_per_stage_defaults() {
        let raw = r#"
            [stages.execute]
            max_attempts = 5

            [retry.run_url]
            delay_ms = 250
        "#;
        let config = PilotConfig::from_toml_str(raw).unwrap();
        let defaults = PilotConfig::default();

        assert_eq!(config.stages.execute.max_attempts, 5);
        assert_eq!(config.stages.execute.delay_ms, 10_000);
        assert_eq!(config.stages.approve, defaults.stages.approve);
        assert!(config.stages.request_enabled);
        assert_eq!(config.retry.run_url.max_attempts, 30);
        assert_eq!(config.retry.run_url.delay_ms, 250);
        assert_eq!(config.retry.configure, defaults.retry.configure);
        config.validate().unwrap();
    }

    #[test]
    fn test_malformed_toml_is_configuration_error() {
        let err = PilotConfig::from_toml_str("[branches\nproduction = ").unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_duplicate_branch_index_rejected() {
        let mut config = PilotConfig::default();
        config.branches.test = config.branches.production;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("reuses dropdown index"));
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let mut config = PilotConfig::default();
        config.retry.configure.max_attempts = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("retry.configure"));
    }

    #[test]
    fn test_empty_selector_rejected() {
        let mut config = PilotConfig::default();
        config.selectors.run_button = "  ".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("selectors.run_button"));
    }

    #[test]
    fn test_empty_markers_rejected() {
        let mut config = PilotConfig::default();
        config.services.sensitive_markers.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            (SCRIPTS_DIR_ENV, "/srv/scripts"),
            (WEBDRIVER_URL_ENV, "http://selenium:4444"),
        ]);
        let mut config = PilotConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.scripts.dir, PathBuf::from("/srv/scripts"));
        assert_eq!(config.webdriver.server_url, "http://selenium:4444");
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pilot.toml");
        std::fs::write(&path, "[scripts]\ndir = \"/opt/scripts\"\n").unwrap();

        let config = PilotConfig::from_file(&path).unwrap();
        assert_eq!(config.scripts.dir, PathBuf::from("/opt/scripts"));
        assert_eq!(config.scripts.extension, "rb");

        let missing = PilotConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(missing.is_configuration());
    }
}

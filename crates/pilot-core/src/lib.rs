//! Pipeline Pilot Core Library
//!
//! Drives a GitLab run-script pipeline through browser automation: configure
//! and trigger the run, then watch its request, approve and execute stages
//! with bounded polling until a terminal verdict.

pub mod config;
pub mod domain;
pub mod driver;
pub mod fakes;
pub mod injector;
pub mod metrics;
pub mod obs;
pub mod orchestrator;
pub mod resolver;
pub mod retry;
pub mod script;
pub mod telemetry;
pub mod watcher;

pub use config::{
    BranchOptions, PhaseRetrySettings, PilotConfig, PipelineSettings, ScriptSettings,
    SelectorMap, ServiceSettings, StageSettings, StageTuning, WebDriverSettings,
};
pub use domain::{
    classify_icon_class, classify_status_label, BadgeState, Branch, CiVariable, Classifier,
    PilotError, PipelineRun, PipelineStage, Result, RunStatus, StageBadge, StageRecord,
    VariableSlot,
};
pub use driver::{Locator, LocatorStep, UiDriver};
pub use injector::{Injected, ServiceSelection, VariableInjector};
pub use orchestrator::{extract_pipeline_id, PipelineOrchestrator, PreparedRun, RunRequest};
pub use resolver::{extract_task_name, DescriptionSource, ResolvedDescription, TicketDescriptionResolver};
pub use retry::{retry_with_policy, RetryPolicy};
pub use script::ScriptStore;
pub use telemetry::init_tracing;
pub use watcher::{poll_until, WatchReport, WatchSpec};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

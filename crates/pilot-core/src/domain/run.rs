//! Pipeline run model: variables, stages and the monotonic run status.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::badge::BadgeState;
use super::branch::Branch;
use super::error::{PilotError, Result};

/// Fixed position of a CI variable in the pipeline form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableSlot {
    Description,
    Service,
    ScriptBody,
}

impl VariableSlot {
    pub const ORDERED: [VariableSlot; 3] = [
        VariableSlot::Description,
        VariableSlot::Service,
        VariableSlot::ScriptBody,
    ];

    /// Row index of the slot in the form.
    pub fn ordinal(&self) -> usize {
        match self {
            VariableSlot::Description => 0,
            VariableSlot::Service => 1,
            VariableSlot::ScriptBody => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VariableSlot::Description => "description",
            VariableSlot::Service => "service",
            VariableSlot::ScriptBody => "script_body",
        }
    }
}

/// A submitted CI variable. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CiVariable {
    slot: VariableSlot,
    value: String,
}

impl CiVariable {
    pub fn new(slot: VariableSlot, value: impl Into<String>) -> Self {
        Self {
            slot,
            value: value.into(),
        }
    }

    pub fn slot(&self) -> VariableSlot {
        self.slot
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

/// Stages of the fixed pipeline topology, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Configure,
    Trigger,
    Request,
    Approve,
    Execute,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Configure => "configure",
            PipelineStage::Trigger => "trigger",
            PipelineStage::Request => "request",
            PipelineStage::Approve => "approve",
            PipelineStage::Execute => "execute",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal status of a run. `Pending` is the only non-terminal value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Passed,
    Failed,
    TimedOut,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Pending)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Pending => "pending",
            RunStatus::Passed => "passed",
            RunStatus::Failed => "failed",
            RunStatus::TimedOut => "timed_out",
        };
        f.write_str(s)
    }
}

/// Outcome of one watched stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: PipelineStage,
    pub final_state: BadgeState,
    pub attempts: u32,
    pub actions: u32,
}

/// A triggered pipeline run, owned and mutated by the orchestrator only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub pipeline_id: Option<u64>,
    pub branch: Branch,
    pub variables: Vec<CiVariable>,
    pub current_stage: PipelineStage,
    pub status: RunStatus,
    pub stages: Vec<StageRecord>,
    pub failure: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    /// Create a run at trigger time.
    pub fn triggered(branch: Branch, variables: Vec<CiVariable>) -> Self {
        Self {
            pipeline_id: None,
            branch,
            variables,
            current_stage: PipelineStage::Trigger,
            status: RunStatus::Pending,
            stages: Vec::new(),
            failure: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn variable(&self, slot: VariableSlot) -> Option<&CiVariable> {
        self.variables.iter().find(|v| v.slot() == slot)
    }

    /// Move to a later stage.
    ///
    /// Stages only advance, and `Execute` requires a successful `Approve`.
    pub fn enter_stage(&mut self, stage: PipelineStage) -> Result<()> {
        self.ensure_pending(stage.as_str())?;

        if stage <= self.current_stage {
            return Err(PilotError::StageOrder {
                entering: stage.to_string(),
                reason: format!("run is already at stage '{}'", self.current_stage),
            });
        }

        if stage == PipelineStage::Execute && !self.stage_succeeded(PipelineStage::Approve) {
            return Err(PilotError::StageOrder {
                entering: stage.to_string(),
                reason: "approve stage has not reached success".to_string(),
            });
        }

        self.current_stage = stage;
        Ok(())
    }

    pub fn record_stage(&mut self, record: StageRecord) -> Result<()> {
        self.ensure_pending("record")?;
        self.stages.push(record);
        Ok(())
    }

    pub fn stage_succeeded(&self, stage: PipelineStage) -> bool {
        self.stages
            .iter()
            .any(|r| r.stage == stage && r.final_state == BadgeState::Success)
    }

    /// Set the terminal status. Fails if the run already finished.
    pub fn finish(&mut self, status: RunStatus, failure: Option<String>) -> Result<()> {
        if !status.is_terminal() {
            return Err(PilotError::InvalidTransition(
                "cannot finish a run as pending".to_string(),
            ));
        }
        self.ensure_pending("finish")?;

        self.status = status;
        self.failure = failure;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    fn ensure_pending(&self, action: &str) -> Result<()> {
        if self.status.is_terminal() {
            return Err(PilotError::InvalidTransition(format!(
                "{} after run finished as {}",
                action, self.status
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_run() -> PipelineRun {
        PipelineRun::triggered(
            Branch::Production,
            vec![
                CiVariable::new(VariableSlot::Description, "ES-100"),
                CiVariable::new(VariableSlot::Service, "ejar3-core-app"),
                CiVariable::new(VariableSlot::ScriptBody, "pp User.count"),
            ],
        )
    }

    fn success(stage: PipelineStage) -> StageRecord {
        StageRecord {
            stage,
            final_state: BadgeState::Success,
            attempts: 1,
            actions: 0,
        }
    }

    #[test]
    fn test_slot_ordinals_are_fixed() {
        let ordinals: Vec<usize> = VariableSlot::ORDERED.iter().map(|s| s.ordinal()).collect();
        assert_eq!(ordinals, vec![0, 1, 2]);
    }

    #[test]
    fn test_variable_lookup() {
        let run = sample_run();
        assert_eq!(
            run.variable(VariableSlot::Service).map(|v| v.value()),
            Some("ejar3-core-app")
        );
    }

    #[test]
    fn test_status_is_monotonic() {
        let mut run = sample_run();
        run.finish(RunStatus::Passed, None).unwrap();

        let err = run.finish(RunStatus::Failed, Some("late".to_string())).unwrap_err();
        assert!(matches!(err, PilotError::InvalidTransition(_)));
        assert_eq!(run.status, RunStatus::Passed);
        assert!(run.failure.is_none());
    }

    #[test]
    fn test_finish_as_pending_rejected() {
        let mut run = sample_run();
        assert!(run.finish(RunStatus::Pending, None).is_err());
        assert_eq!(run.status, RunStatus::Pending);
    }

    #[test]
    fn test_execute_requires_successful_approve() {
        let mut run = sample_run();
        run.enter_stage(PipelineStage::Approve).unwrap();

        let err = run.enter_stage(PipelineStage::Execute).unwrap_err();
        assert!(matches!(err, PilotError::StageOrder { .. }));

        run.record_stage(success(PipelineStage::Approve)).unwrap();
        run.enter_stage(PipelineStage::Execute).unwrap();
        assert_eq!(run.current_stage, PipelineStage::Execute);
    }

    #[test]
    fn test_stages_only_advance() {
        let mut run = sample_run();
        run.enter_stage(PipelineStage::Approve).unwrap();
        assert!(run.enter_stage(PipelineStage::Request).is_err());
        assert!(run.enter_stage(PipelineStage::Approve).is_err());
    }

    #[test]
    fn test_finished_run_rejects_stage_changes() {
        let mut run = sample_run();
        run.finish(RunStatus::TimedOut, Some("no run url".to_string()))
            .unwrap();
        assert!(run.enter_stage(PipelineStage::Request).is_err());
        assert!(run.record_stage(success(PipelineStage::Request)).is_err());
        assert!(run.finished_at.is_some());
    }
}

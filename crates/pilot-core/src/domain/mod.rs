//! Domain model for Pipeline Pilot.

pub mod badge;
pub mod branch;
pub mod error;
pub mod run;

pub use badge::{classify_icon_class, classify_status_label, BadgeState, Classifier, StageBadge};
pub use branch::Branch;
pub use error::{PilotError, Result};
pub use run::{CiVariable, PipelineRun, PipelineStage, RunStatus, StageRecord, VariableSlot};

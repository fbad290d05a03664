//! Final run summary.

use pilot_core::{PipelineRun, RunStatus};

pub fn render_run(run: &PipelineRun) -> String {
    let id = run
        .pipeline_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let mut out = format!("Pipeline {} on {}: {}\n", id, run.branch, run.status);
    for record in &run.stages {
        out.push_str(&format!(
            "  {:<8} {} ({} polls, {} actions)\n",
            record.stage.as_str(),
            record.final_state,
            record.attempts,
            record.actions
        ));
    }
    if let Some(failure) = &run.failure {
        out.push_str(&format!("Failure: {}\n", failure));
    }
    out
}

/// Process exit status for a finished run.
pub fn succeeded(run: &PipelineRun) -> bool {
    run.status == RunStatus::Passed
}

#[cfg(test)]
mod tests {
    use super::*;
    use pilot_core::{BadgeState, Branch, PipelineStage, StageRecord};

    #[test]
    fn test_render_timed_out_run() {
        let mut run = PipelineRun::triggered(Branch::Uat, Vec::new());
        run.pipeline_id = Some(77);
        run.enter_stage(PipelineStage::Approve).unwrap();
        run.record_stage(StageRecord {
            stage: PipelineStage::Request,
            final_state: BadgeState::Success,
            attempts: 2,
            actions: 0,
        })
        .unwrap();
        run.finish(RunStatus::TimedOut, Some("stage 'approve' timed out after 20 attempt(s)".to_string()))
            .unwrap();

        let out = render_run(&run);
        assert!(out.starts_with("Pipeline 77 on uat: timed_out"));
        assert!(out.contains("request  success (2 polls, 0 actions)"));
        assert!(out.contains("Failure: stage 'approve' timed out"));
        assert!(!succeeded(&run));
    }
}

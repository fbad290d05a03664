//! Bounded polling of stage badges.
//!
//! Every stage of a run (request, approve, execute) is watched by the same
//! loop, [`poll_until`]. What differs between stages is data: which badge to
//! read, how to classify it and whether a neutral badge is pushed forward by
//! clicking a gating action. That data is a [`WatchSpec`].
//!
//! Per attempt the loop locates the badge, classifies it and then:
//!
//! * `Success` ends the watch at once, without any action.
//! * `Failed` ends the watch with [`PilotError::StageFailed`].
//! * `Neutral` with an action clicks the action once, waits the settle delay
//!   and re-reads. A badge still neutral after that counts as a failed
//!   attempt.
//! * Anything else waits for the next attempt.
//!
//! Between attempts the page is reloaded and the policy delay elapses.
//! Running out of attempts yields [`PilotError::StageTimeout`]. Badge lookup
//! failures are transient and only consume an attempt.

use std::time::Duration;

use tracing::{debug, warn};

use crate::config::PilotConfig;
use crate::domain::{BadgeState, Classifier, PilotError, PipelineStage, Result, StageBadge, StageRecord};
use crate::driver::{Locator, UiDriver};
use crate::metrics::METRICS;
use crate::obs;
use crate::retry::RetryPolicy;

/// How one stage is observed and, if needed, pushed forward.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchSpec {
    pub stage: PipelineStage,
    /// Stage badge.
    pub badge: Locator,
    /// Tried when `badge` does not resolve.
    pub fallback: Option<Locator>,
    /// Element inside the badge carrying the state attribute. `None` reads
    /// the badge itself.
    pub state_element: Option<String>,
    pub classifier: Classifier,
    /// Gating control inside the badge, clicked when the badge is neutral.
    pub action: Option<String>,
    pub badge_wait: Duration,
    pub settle: Duration,
    pub policy: RetryPolicy,
}

impl WatchSpec {
    /// Optional "request" stage. Observed only, never clicked.
    pub fn request(config: &PilotConfig) -> Self {
        let tuning = &config.stages.request;
        Self {
            stage: PipelineStage::Request,
            badge: Locator::css(&config.selectors.request_badge),
            fallback: config.selectors.request_badge_fallback.as_deref().map(Locator::css),
            state_element: Some(config.selectors.ci_icon.clone()),
            classifier: Classifier::IconClass,
            action: None,
            badge_wait: tuning.badge_wait(),
            settle: tuning.settle(),
            policy: tuning.policy(),
        }
    }

    /// Manual "approve" stage, played when neutral.
    pub fn approve(config: &PilotConfig) -> Self {
        let tuning = &config.stages.approve;
        Self {
            stage: PipelineStage::Approve,
            badge: Locator::css(&config.selectors.approve_badge),
            fallback: config.selectors.approve_badge_fallback.as_deref().map(Locator::css),
            state_element: Some(config.selectors.ci_icon.clone()),
            classifier: Classifier::IconClass,
            action: Some(config.selectors.action_button.clone()),
            badge_wait: tuning.badge_wait(),
            settle: tuning.settle(),
            policy: tuning.policy(),
        }
    }

    /// Script job status icon, read through its status label.
    pub fn execute(config: &PilotConfig) -> Self {
        let tuning = &config.stages.execute;
        Self {
            stage: PipelineStage::Execute,
            badge: Locator::css(&config.selectors.job_status_icon),
            fallback: None,
            state_element: None,
            classifier: Classifier::StatusLabel,
            action: None,
            badge_wait: tuning.badge_wait(),
            settle: tuning.settle(),
            policy: tuning.policy(),
        }
    }

    fn state_locator(&self, badge: &Locator) -> Locator {
        match &self.state_element {
            Some(selector) => badge.child(selector.as_str()),
            None => badge.clone(),
        }
    }
}

/// Verdict of a finished watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchReport {
    pub stage: PipelineStage,
    pub final_state: BadgeState,
    /// Polls performed, including the one that reached the verdict.
    pub attempts: u32,
    /// Gating actions clicked.
    pub actions: u32,
}

impl WatchReport {
    pub fn record(&self) -> StageRecord {
        StageRecord {
            stage: self.stage,
            final_state: self.final_state,
            attempts: self.attempts,
            actions: self.actions,
        }
    }
}

/// Resolve the badge, trying the fallback locator second.
async fn locate<D: UiDriver + ?Sized>(driver: &D, spec: &WatchSpec) -> Result<Locator> {
    match driver.wait_for_element(&spec.badge, spec.badge_wait).await {
        Ok(()) => Ok(spec.badge.clone()),
        Err(err) => match &spec.fallback {
            Some(fallback) if err.is_retryable() => {
                debug!(stage = %spec.stage, badge = %spec.badge, fallback = %fallback, "Badge not found, trying fallback");
                driver.wait_for_element(fallback, spec.badge_wait).await?;
                Ok(fallback.clone())
            }
            _ => Err(err),
        },
    }
}

/// Read and classify the state element. Never cached across polls.
async fn observe<D: UiDriver + ?Sized>(driver: &D, spec: &WatchSpec, badge: &Locator) -> Result<StageBadge> {
    let raw = driver
        .read_attribute(&spec.state_locator(badge), spec.classifier.attribute())
        .await?;
    let state = spec.classifier.classify(raw.as_deref());
    debug!(stage = %spec.stage, raw = ?raw, state = %state, "Badge observed");
    Ok(StageBadge {
        stage: spec.stage.to_string(),
        state,
    })
}

/// Outcome of a single attempt.
enum Poll {
    Done(BadgeState),
    Pending(BadgeState),
    Retry(PilotError),
}

async fn attempt<D: UiDriver + ?Sized>(driver: &D, spec: &WatchSpec, actions: &mut u32) -> Result<Poll> {
    let badge = match locate(driver, spec).await {
        Ok(badge) => badge,
        Err(err) if err.is_retryable() => return Ok(Poll::Retry(err)),
        Err(err) => return Err(err),
    };

    let observed = match observe(driver, spec, &badge).await {
        Ok(observed) => observed,
        Err(err) if err.is_retryable() => return Ok(Poll::Retry(err)),
        Err(err) => return Err(err),
    };

    match (observed.state, &spec.action) {
        (state, _) if state.is_terminal() => Ok(Poll::Done(state)),
        (BadgeState::Neutral, Some(action)) => {
            let action = badge.child(action.as_str());
            *actions += 1;
            METRICS.inc_gating_actions();
            debug!(stage = %spec.stage, action = %action, "Badge neutral, clicking gating action");

            if let Err(err) = driver.click(&action).await {
                if err.is_retryable() {
                    return Ok(Poll::Retry(err));
                }
                return Err(err);
            }
            tokio::time::sleep(spec.settle).await;

            match observe(driver, spec, &badge).await {
                Ok(after) if after.state.is_terminal() => Ok(Poll::Done(after.state)),
                Ok(after) if after.state == BadgeState::Neutral => Ok(Poll::Retry(PilotError::TransientUi(
                    format!("{} badge still neutral after gating action", spec.stage),
                ))),
                Ok(after) => Ok(Poll::Pending(after.state)),
                Err(err) if err.is_retryable() => Ok(Poll::Retry(err)),
                Err(err) => Err(err),
            }
        }
        (state, _) => Ok(Poll::Pending(state)),
    }
}

/// Watch a stage until its badge reaches a terminal state or the policy's
/// attempts run out.
pub async fn poll_until<D: UiDriver + ?Sized>(driver: &D, spec: &WatchSpec) -> Result<WatchReport> {
    let max_attempts = spec.policy.attempts();
    let stage = spec.stage.as_str();
    let mut actions = 0;
    let mut last_state = BadgeState::Unknown;

    obs::emit_stage_started(stage, max_attempts);

    for attempt_no in 1..=max_attempts {
        METRICS.inc_polls();

        match attempt(driver, spec, &mut actions).await? {
            Poll::Done(state) => {
                obs::emit_stage_finished(stage, state, attempt_no, actions);
                if state == BadgeState::Failed {
                    return Err(PilotError::StageFailed {
                        stage: stage.to_string(),
                        state,
                    });
                }
                return Ok(WatchReport {
                    stage: spec.stage,
                    final_state: state,
                    attempts: attempt_no,
                    actions,
                });
            }
            Poll::Pending(state) => {
                last_state = state;
                debug!(stage = %stage, attempt = attempt_no, max_attempts, state = %state, "Stage not finished yet");
            }
            Poll::Retry(err) => {
                obs::emit_attempt_failed(stage, attempt_no, max_attempts, &err);
            }
        }

        if attempt_no < max_attempts {
            match driver.reload().await {
                Ok(()) => METRICS.inc_reloads(),
                Err(err) => warn!(stage = %stage, error = %err, "Reload failed, continuing"),
            }
            tokio::time::sleep(spec.policy.delay()).await;
        }
    }

    warn!(stage = %stage, attempts = max_attempts, last_state = %last_state, "Stage watch timed out");
    Err(PilotError::StageTimeout {
        stage: stage.to_string(),
        attempts: max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{ClickEffect, FakeDriver};

    const NEUTRAL: &str = "ci-icon ci-icon-variant-neutral badge-neutral";
    const RUNNING: &str = "ci-icon ci-icon-variant-info badge-info";
    const SUCCESS: &str = "ci-icon ci-icon-variant-success badge-success";
    const FAILED: &str = "ci-icon ci-icon-variant-failed badge-danger";

    fn approve_spec() -> WatchSpec {
        let mut spec = WatchSpec::approve(&PilotConfig::default());
        spec.policy = RetryPolicy::new(4, Duration::from_secs(5));
        spec
    }

    fn icon(spec: &WatchSpec) -> Locator {
        spec.state_locator(&spec.badge)
    }

    fn action(spec: &WatchSpec) -> Locator {
        spec.badge.child(spec.action.clone().unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_returns_without_action() {
        let driver = FakeDriver::new();
        let spec = approve_spec();
        driver.set_attribute(&icon(&spec), "class", SUCCESS);
        driver.add_element(&action(&spec));

        let report = poll_until(&driver, &spec).await.unwrap();

        assert_eq!(report.final_state, BadgeState::Success);
        assert_eq!(report.attempts, 1);
        assert_eq!(report.actions, 0);
        assert_eq!(driver.clicks_on(&action(&spec)), 0);
        assert_eq!(driver.reloads(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_badge_is_stage_failure() {
        let driver = FakeDriver::new();
        let spec = approve_spec();
        driver.set_attribute(&icon(&spec), "class", FAILED);

        let err = poll_until(&driver, &spec).await.unwrap_err();
        assert!(matches!(err, PilotError::StageFailed { state: BadgeState::Failed, .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_neutral_clicks_action_then_succeeds() {
        let driver = FakeDriver::new();
        let spec = approve_spec();
        driver.set_attribute(&icon(&spec), "class", NEUTRAL);
        driver.add_element(&action(&spec));
        driver.on_click(
            &action(&spec),
            ClickEffect::SetAttribute {
                locator: icon(&spec),
                name: "class".to_string(),
                values: vec![RUNNING.to_string(), SUCCESS.to_string()],
            },
        );

        let report = poll_until(&driver, &spec).await.unwrap();

        // Click, re-read shows running, reload, next poll shows success.
        assert_eq!(report.final_state, BadgeState::Success);
        assert_eq!(report.attempts, 2);
        assert_eq!(report.actions, 1);
        assert_eq!(driver.clicks_on(&action(&spec)), 1);
        assert_eq!(driver.reloads(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_leaving_neutral_times_out_after_max_actions() {
        let driver = FakeDriver::new();
        let spec = approve_spec();
        driver.set_attribute(&icon(&spec), "class", NEUTRAL);
        driver.add_element(&action(&spec));

        let start = tokio::time::Instant::now();
        let err = poll_until(&driver, &spec).await.unwrap_err();

        match err {
            PilotError::StageTimeout { stage, attempts } => {
                assert_eq!(stage, "approve");
                assert_eq!(attempts, 4);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(driver.clicks_on(&action(&spec)), 4);
        assert_eq!(driver.reloads(), 3);
        // Four settles of 2s and three delays of 5s.
        assert_eq!(start.elapsed(), Duration::from_secs(23));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reload_failure_does_not_abort_watch() {
        let driver = FakeDriver::new();
        let mut spec = WatchSpec::request(&PilotConfig::default());
        spec.policy = RetryPolicy::new(4, Duration::from_secs(1));
        driver.set_attribute_sequence(&icon(&spec), "class", &[RUNNING, RUNNING, SUCCESS]);
        driver.fail_reloads(2);

        let report = poll_until(&driver, &spec).await.unwrap();

        assert_eq!(report.final_state, BadgeState::Success);
        assert_eq!(report.attempts, 3);
        assert_eq!(driver.reloads(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_badge_uses_fallback() {
        let driver = FakeDriver::new();
        let spec = approve_spec();
        let fallback = spec.fallback.clone().unwrap();
        driver.set_attribute(&spec.state_locator(&fallback), "class", SUCCESS);

        let report = poll_until(&driver, &spec).await.unwrap();
        assert_eq!(report.final_state, BadgeState::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_badge_is_transient_until_timeout() {
        let driver = FakeDriver::new();
        let spec = WatchSpec::request(&PilotConfig::default());

        let err = poll_until(&driver, &spec).await.unwrap_err();
        assert!(matches!(err, PilotError::StageTimeout { attempts: 10, .. }));
        assert_eq!(driver.reloads(), 9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_never_clicks_when_neutral() {
        let driver = FakeDriver::new();
        let mut spec = WatchSpec::request(&PilotConfig::default());
        spec.policy = RetryPolicy::new(3, Duration::from_secs(1));
        driver.set_attribute_sequence(&icon(&spec), "class", &[NEUTRAL, RUNNING, SUCCESS]);

        let report = poll_until(&driver, &spec).await.unwrap();
        assert_eq!(report.attempts, 3);
        assert_eq!(report.actions, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_reads_status_label() {
        let driver = FakeDriver::new();
        let spec = WatchSpec::execute(&PilotConfig::default());
        driver.set_attribute_sequence(
            &spec.badge,
            "aria-label",
            &["Status: Pending", "Status: Running", "Status: Passed"],
        );

        let report = poll_until(&driver, &spec).await.unwrap();
        assert_eq!(report.stage, PipelineStage::Execute);
        assert_eq!(report.final_state, BadgeState::Success);
        assert_eq!(report.attempts, 3);
        assert_eq!(report.record().attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_failed_label() {
        let driver = FakeDriver::new();
        let spec = WatchSpec::execute(&PilotConfig::default());
        driver.set_attribute(&spec.badge, "aria-label", "Status: Failed");

        let err = poll_until(&driver, &spec).await.unwrap_err();
        assert!(matches!(err, PilotError::StageFailed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_click_counts_as_attempt() {
        let driver = FakeDriver::new();
        let spec = approve_spec();
        driver.set_attribute(&icon(&spec), "class", NEUTRAL);
        driver.add_element(&action(&spec));
        driver.fail_clicks(&action(&spec), 1);
        driver.on_click(
            &action(&spec),
            ClickEffect::SetAttribute {
                locator: icon(&spec),
                name: "class".to_string(),
                values: vec![SUCCESS.to_string()],
            },
        );

        let report = poll_until(&driver, &spec).await.unwrap();
        assert_eq!(report.attempts, 2);
        assert_eq!(report.actions, 2);
    }
}

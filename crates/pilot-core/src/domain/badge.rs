//! Stage badge states and the classifiers that derive them.
//!
//! Every string heuristic used to interpret remote stage indicators lives in
//! this module. Callers only ever see a [`BadgeState`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Observed state of a stage badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgeState {
    /// Badge not readable or not recognised.
    Unknown,
    /// Waiting for a manual action (e.g. an approval button).
    Neutral,
    /// Running, pending or otherwise not yet settled.
    InProgress,
    Success,
    Failed,
}

impl BadgeState {
    /// Whether the state ends a watch.
    pub fn is_terminal(&self) -> bool {
        matches!(self, BadgeState::Success | BadgeState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BadgeState::Unknown => "unknown",
            BadgeState::Neutral => "neutral",
            BadgeState::InProgress => "in_progress",
            BadgeState::Success => "success",
            BadgeState::Failed => "failed",
        }
    }
}

impl fmt::Display for BadgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the raw attribute value of a badge is turned into a [`BadgeState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classifier {
    /// `class` attribute of a `ci-icon` element.
    IconClass,
    /// `aria-label` of a job status icon, e.g. `Status: Passed`.
    StatusLabel,
}

impl Classifier {
    /// Attribute this classifier reads.
    pub fn attribute(&self) -> &'static str {
        match self {
            Classifier::IconClass => "class",
            Classifier::StatusLabel => "aria-label",
        }
    }

    pub fn classify(&self, raw: Option<&str>) -> BadgeState {
        match raw {
            None => BadgeState::Unknown,
            Some(value) => match self {
                Classifier::IconClass => classify_icon_class(value),
                Classifier::StatusLabel => classify_status_label(value),
            },
        }
    }
}

const SUCCESS_MARKERS: &[&str] = &["ci-icon-variant-success", "badge-success"];
const FAILED_MARKERS: &[&str] = &[
    "ci-icon-variant-failed",
    "ci-icon-variant-error",
    "ci-icon-variant-danger",
    "badge-failed",
    "badge-danger",
];
const NEUTRAL_MARKERS: &[&str] = &["ci-icon-variant-neutral", "badge-neutral"];
const IN_PROGRESS_MARKERS: &[&str] = &[
    "ci-icon-variant-info",
    "ci-icon-variant-warning",
    "badge-info",
    "badge-warning",
];

/// Classify a `ci-icon` class list.
pub fn classify_icon_class(class: &str) -> BadgeState {
    let has = |markers: &[&str]| markers.iter().any(|m| class.contains(m));

    if has(SUCCESS_MARKERS) {
        BadgeState::Success
    } else if has(FAILED_MARKERS) {
        BadgeState::Failed
    } else if has(NEUTRAL_MARKERS) {
        BadgeState::Neutral
    } else if has(IN_PROGRESS_MARKERS) {
        BadgeState::InProgress
    } else {
        BadgeState::Unknown
    }
}

/// Classify a job status label such as `Status: Passed`.
pub fn classify_status_label(label: &str) -> BadgeState {
    let lowered = label.trim().to_lowercase();
    let status = lowered
        .strip_prefix("status:")
        .map(str::trim)
        .unwrap_or(lowered.as_str());

    match status.split_whitespace().next() {
        Some("passed") | Some("success") => BadgeState::Success,
        Some("failed") | Some("canceled") | Some("cancelled") => BadgeState::Failed,
        Some("running") | Some("pending") | Some("created") | Some("preparing")
        | Some("waiting") | Some("scheduled") => BadgeState::InProgress,
        Some("manual") => BadgeState::Neutral,
        _ => BadgeState::Unknown,
    }
}

/// One observation of a stage badge. Never cached across polls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageBadge {
    pub stage: String,
    pub state: BadgeState,
}

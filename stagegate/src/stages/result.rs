//! Per-stage result type.

use super::Capability;
use crate::core::{StagePayload, StageStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of one stage in one pipeline run.
///
/// Created exactly once, when the stage finishes or is skipped, and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    /// Stage name.
    pub stage: String,
    /// The capability the stage invoked.
    pub capability: Capability,
    /// Whether the stage is critical.
    pub critical: bool,
    /// Stage status.
    pub status: StageStatus,
    /// Validator payload, present when the validator settled successfully.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<StagePayload>,
    /// Error message, present iff the stage failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Whether the failure was a timeout.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub timed_out: bool,
    /// Skip reason, present iff the stage was skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    /// When the stage started.
    pub started_at: DateTime<Utc>,
    /// When the stage finished.
    pub completed_at: DateTime<Utc>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

impl StageResult {
    /// Creates a completed stage result.
    #[must_use]
    pub fn completed(
        stage: impl Into<String>,
        capability: Capability,
        critical: bool,
        payload: StagePayload,
        started_at: DateTime<Utc>,
        duration_ms: u64,
    ) -> Self {
        Self {
            stage: stage.into(),
            capability,
            critical,
            status: StageStatus::Completed,
            payload: Some(payload),
            error: None,
            timed_out: false,
            skip_reason: None,
            started_at,
            completed_at: Utc::now(),
            duration_ms,
        }
    }

    /// Creates a failed stage result.
    #[must_use]
    pub fn failed(
        stage: impl Into<String>,
        capability: Capability,
        critical: bool,
        error: impl Into<String>,
        started_at: DateTime<Utc>,
        duration_ms: u64,
    ) -> Self {
        Self {
            stage: stage.into(),
            capability,
            critical,
            status: StageStatus::Failed,
            payload: None,
            error: Some(error.into()),
            timed_out: false,
            skip_reason: None,
            started_at,
            completed_at: Utc::now(),
            duration_ms,
        }
    }

    /// Creates a skipped stage result. Skipped stages never ran, so both
    /// timestamps are the moment the skip was decided.
    #[must_use]
    pub fn skipped(
        stage: impl Into<String>,
        capability: Capability,
        critical: bool,
        reason: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            stage: stage.into(),
            capability,
            critical,
            status: StageStatus::Skipped,
            payload: None,
            error: None,
            timed_out: false,
            skip_reason: Some(reason.into()),
            started_at: now,
            completed_at: now,
            duration_ms: 0,
        }
    }

    /// Marks a failed result as a timeout.
    #[must_use]
    pub fn with_timeout_flag(mut self) -> Self {
        self.timed_out = true;
        self
    }

    /// Returns true if the stage completed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Returns true if the stage failed.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.status.is_failure()
    }

    /// Returns true if the payload reports at least one issue.
    #[must_use]
    pub fn has_issues(&self) -> bool {
        self.payload.as_ref().is_some_and(|p| !p.issues.is_empty())
    }
}

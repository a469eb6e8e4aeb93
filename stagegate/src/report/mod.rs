//! The final report of a pipeline run.

mod aggregator;

pub use aggregator::{Aggregate, IssueSummary, ResultAggregator};

use crate::core::{Grade, OverallStatus, QualityGate, ResourceMetrics, SecurityFinding, StageStatus};
use crate::diagnostics::ErrorContext;
use crate::errors::StagegateError;
use crate::pipeline::ExecutionMetrics;
use crate::stages::StageResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// Everything a caller learns from one run.
///
/// A run always produces a well-formed result, including runs that were
/// aborted or never started because the stage graph was invalid; those
/// carry `overall_status = error` and a `pipeline_error` context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    /// The run id.
    pub run_id: Uuid,
    /// Verdict for the whole run.
    pub overall_status: OverallStatus,
    /// Percentage of stages that completed.
    pub overall_score: f64,
    /// Letter grade for the score.
    pub grade: Grade,
    /// Result per stage that reached a terminal state.
    pub stage_results: HashMap<String, StageResult>,
    /// Recommendations in stage declaration order.
    pub recommendations: Vec<String>,
    /// Quality gates by stage.
    pub quality_gates: BTreeMap<String, QualityGate>,
    /// Findings from security scan stages.
    pub security_findings: Vec<SecurityFinding>,
    /// Combined resource usage.
    pub resource_usage: ResourceMetrics,
    /// Issue counts by severity.
    pub issue_summary: IssueSummary,
    /// Contexts for failed stages and stages with issues.
    pub error_contexts: Vec<ErrorContext>,
    /// Present iff the status is `error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_error: Option<ErrorContext>,
    /// Duration of each stage that ran.
    pub stage_durations: BTreeMap<String, u64>,
    /// Outcome counts.
    pub execution_metrics: ExecutionMetrics,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub completed_at: DateTime<Utc>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

impl PipelineResult {
    /// Assembles a result from an aggregate.
    #[must_use]
    pub fn from_aggregate(
        run_id: Uuid,
        aggregate: Aggregate,
        stage_results: HashMap<String, StageResult>,
        execution_metrics: ExecutionMetrics,
        started_at: DateTime<Utc>,
    ) -> Self {
        let completed_at = Utc::now();
        Self {
            run_id,
            overall_status: aggregate.overall_status,
            overall_score: aggregate.overall_score,
            grade: aggregate.grade,
            stage_results,
            recommendations: aggregate.recommendations,
            quality_gates: aggregate.quality_gates,
            security_findings: aggregate.security_findings,
            resource_usage: aggregate.resource_usage,
            issue_summary: aggregate.issue_summary,
            error_contexts: Vec::new(),
            pipeline_error: None,
            stage_durations: aggregate.stage_durations,
            execution_metrics,
            started_at,
            completed_at,
            duration_ms: elapsed_ms(started_at, completed_at),
        }
    }

    /// Builds the result of a run that never executed a stage.
    #[must_use]
    pub fn not_started(run_id: Uuid, error: ErrorContext, started_at: DateTime<Utc>) -> Self {
        let completed_at = Utc::now();
        Self {
            run_id,
            overall_status: OverallStatus::Error,
            overall_score: 0.0,
            grade: Grade::F,
            stage_results: HashMap::new(),
            recommendations: Vec::new(),
            quality_gates: BTreeMap::new(),
            security_findings: Vec::new(),
            resource_usage: ResourceMetrics::default(),
            issue_summary: IssueSummary::default(),
            error_contexts: Vec::new(),
            pipeline_error: Some(error),
            stage_durations: BTreeMap::new(),
            execution_metrics: ExecutionMetrics::default(),
            started_at,
            completed_at,
            duration_ms: elapsed_ms(started_at, completed_at),
        }
    }

    /// Marks the run as errored with a pipeline-level context.
    #[must_use]
    pub fn with_pipeline_error(mut self, error: ErrorContext) -> Self {
        self.overall_status = OverallStatus::Error;
        self.pipeline_error = Some(error);
        self
    }

    /// Attaches stage error contexts.
    #[must_use]
    pub fn with_error_contexts(mut self, contexts: Vec<ErrorContext>) -> Self {
        self.error_contexts = contexts;
        self
    }

    /// Returns true if the run succeeded without any failure.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.overall_status == OverallStatus::Success
    }

    /// Returns the names of stages with the given status, sorted.
    #[must_use]
    pub fn stages_with_status(&self, status: StageStatus) -> Vec<String> {
        let mut names: Vec<String> = self
            .stage_results
            .values()
            .filter(|r| r.status == status)
            .map(|r| r.stage.clone())
            .collect();
        names.sort();
        names
    }

    /// Serializes the result as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, StagegateError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn elapsed_ms(started_at: DateTime<Utc>, completed_at: DateTime<Utc>) -> u64 {
    u64::try_from((completed_at - started_at).num_milliseconds()).unwrap_or(0)
}

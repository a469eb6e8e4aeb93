//! Structured error contexts for failed stages and aborted runs.

use super::remediation_for;
use crate::core::{ChangeDescriptor, Issue, Severity, StagePayload, StageStatus};
use crate::errors::GraphError;
use crate::stages::StageResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// What kind of problem an error context describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// The stage itself failed (validator error, panic or timeout).
    ExecutionError,
    /// The stage completed but reported issues.
    ValidationIssue,
    /// The run as a whole could not complete.
    PipelineError,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExecutionError => write!(f, "execution_error"),
            Self::ValidationIssue => write!(f, "validation_issue"),
            Self::PipelineError => write!(f, "pipeline_error"),
        }
    }
}

/// How urgently a problem should be addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixPriority {
    /// Can wait.
    Normal,
    /// Should be fixed before merging.
    High,
    /// Blocks everything else.
    Immediate,
}

impl FixPriority {
    /// Derives the priority from stage criticality and outcome.
    #[must_use]
    pub fn for_stage(critical: bool, failed: bool, has_issues: bool) -> Self {
        match (critical, failed) {
            (true, true) => Self::Immediate,
            (true, false) if has_issues => Self::High,
            (false, true) => Self::High,
            _ => Self::Normal,
        }
    }
}

impl fmt::Display for FixPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::High => write!(f, "high"),
            Self::Immediate => write!(f, "immediate"),
        }
    }
}

/// A diagnostic bundle describing one problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Unique id of this context.
    pub context_id: Uuid,
    /// The run that produced it.
    pub run_id: Uuid,
    /// The stage it is about; `None` for pipeline-level contexts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    /// Problem kind.
    pub classification: Classification,
    /// Stable error code, when one exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Summary of the problem.
    pub message: String,
    /// Issues reported by the stage.
    #[serde(default)]
    pub issues: Vec<Issue>,
    /// Fix suggestions gathered from the issues.
    #[serde(default)]
    pub suggestions: Vec<String>,
    /// Files involved.
    #[serde(default)]
    pub affected_files: Vec<String>,
    /// Overall severity.
    pub severity: Severity,
    /// Urgency.
    pub fix_priority: FixPriority,
    /// Generic remediation steps for this kind of stage.
    #[serde(default)]
    pub remediation: Vec<String>,
    /// The change under validation.
    pub change: ChangeDescriptor,
    /// When the context was built.
    pub timestamp: DateTime<Utc>,
    /// Additional context.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ErrorContext {
    /// Returns true if this context needs attention before anything else.
    #[must_use]
    pub fn is_blocking(&self) -> bool {
        self.fix_priority == FixPriority::Immediate
    }
}

/// Builds [`ErrorContext`]s for one run.
#[derive(Debug, Clone)]
pub struct ErrorContextBuilder {
    run_id: Uuid,
    change: Arc<ChangeDescriptor>,
}

impl ErrorContextBuilder {
    /// Creates a builder for a run.
    #[must_use]
    pub fn new(run_id: Uuid, change: Arc<ChangeDescriptor>) -> Self {
        Self { run_id, change }
    }

    /// Builds the context for a stage result.
    ///
    /// Returns `None` for stages that neither failed nor reported issues.
    /// Skipped stages never get a context; their failed dependency already
    /// has one.
    #[must_use]
    pub fn build(&self, result: &StageResult) -> Option<ErrorContext> {
        let failed = result.status == StageStatus::Failed;
        let has_issues = result.has_issues();
        if result.status == StageStatus::Skipped || !(failed || has_issues) {
            return None;
        }

        let issues = result
            .payload
            .as_ref()
            .map(|p| p.issues.clone())
            .unwrap_or_default();

        let mut suggestions: Vec<String> = Vec::new();
        for suggestion in issues.iter().filter_map(|i| i.suggestion.as_ref()) {
            if !suggestions.contains(suggestion) {
                suggestions.push(suggestion.clone());
            }
        }

        let mut affected_files = result
            .payload
            .as_ref()
            .map(StagePayload::affected_files)
            .unwrap_or_default();
        if affected_files.is_empty() && failed {
            affected_files.clone_from(&self.change.files_changed);
        }

        let worst = result.payload.as_ref().and_then(StagePayload::worst_severity);
        let severity = if failed {
            worst.map_or(Severity::High, |s| s.max(Severity::High))
        } else {
            worst.unwrap_or_default()
        };

        let (classification, message) = if failed {
            (
                Classification::ExecutionError,
                result
                    .error
                    .clone()
                    .unwrap_or_else(|| format!("Stage '{}' failed", result.stage)),
            )
        } else {
            (
                Classification::ValidationIssue,
                format!("Stage '{}' reported {} issue(s)", result.stage, issues.len()),
            )
        };

        let mut metadata = HashMap::new();
        metadata.insert("capability".to_string(), serde_json::json!(result.capability));
        metadata.insert("critical".to_string(), serde_json::json!(result.critical));
        metadata.insert("duration_ms".to_string(), serde_json::json!(result.duration_ms));
        if result.timed_out {
            metadata.insert("timed_out".to_string(), serde_json::json!(true));
        }

        Some(ErrorContext {
            context_id: Uuid::new_v4(),
            run_id: self.run_id,
            stage: Some(result.stage.clone()),
            classification,
            code: None,
            message,
            issues,
            suggestions,
            affected_files,
            severity,
            fix_priority: FixPriority::for_stage(result.critical, failed, has_issues),
            remediation: remediation_for(&result.stage),
            change: (*self.change).clone(),
            timestamp: Utc::now(),
            metadata,
        })
    }

    /// Builds contexts for every qualifying result, in the given order.
    #[must_use]
    pub fn build_all<'a>(
        &self,
        order: impl IntoIterator<Item = &'a String>,
        results: &HashMap<String, StageResult>,
    ) -> Vec<ErrorContext> {
        order
            .into_iter()
            .filter_map(|name| results.get(name))
            .filter_map(|result| self.build(result))
            .collect()
    }

    /// Builds the pipeline-level context for a run that could not complete.
    #[must_use]
    pub fn build_pipeline_error(&self, error: impl Into<String>) -> ErrorContext {
        ErrorContext {
            context_id: Uuid::new_v4(),
            run_id: self.run_id,
            stage: None,
            classification: Classification::PipelineError,
            code: None,
            message: error.into(),
            issues: Vec::new(),
            suggestions: Vec::new(),
            affected_files: self.change.files_changed.clone(),
            severity: Severity::Critical,
            fix_priority: FixPriority::Immediate,
            remediation: vec![
                "Fix the failing stages listed in the stage results".to_string(),
                "Re-run the pipeline once the blocking failures are resolved".to_string(),
            ],
            change: (*self.change).clone(),
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    /// Builds the pipeline-level context for an invalid stage graph.
    #[must_use]
    pub fn build_graph_error(&self, error: &GraphError) -> ErrorContext {
        let info = error.error_info();
        let mut context = self.build_pipeline_error(info.summary);
        context.code = Some(info.code);
        context.remediation = info.fix_hint.into_iter().collect();
        context
            .metadata
            .insert("stages".to_string(), serde_json::json!(error.stages()));
        context
    }
}

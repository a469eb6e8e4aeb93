//! Single-stage execution under a deadline.

use super::StageDefinition;
use crate::errors::ValidatorError;
use crate::events::{EventSink, NoOpEventSink, STAGE_COMPLETED, STAGE_FAILED, STAGE_STARTED};
use crate::observability::SpanTimer;
use crate::stages::{StageResult, ValidationContext};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinError;
use tracing::{debug, warn};

/// Runs one stage's validator and converts every outcome into a
/// [`StageResult`].
///
/// The validator runs on its own task and races a timer set to the stage's
/// deadline. If the timer wins the stage fails with a timeout and the
/// validator task is aborted at its next suspension point; killing any
/// external process it started remains the validator's job.
#[derive(Clone)]
pub struct StageExecutor {
    default_timeout: Duration,
    sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for StageExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageExecutor")
            .field("default_timeout", &self.default_timeout)
            .finish_non_exhaustive()
    }
}

impl StageExecutor {
    /// Creates an executor using `default_timeout` for stages without an
    /// explicit deadline.
    #[must_use]
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            default_timeout,
            sink: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Returns the default deadline.
    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Executes a stage.
    ///
    /// Never fails: validator errors, panics and timeouts all come back as a
    /// `failed` result. Timestamps and duration are recorded in every case.
    pub async fn execute(&self, def: &StageDefinition, ctx: ValidationContext) -> StageResult {
        let timeout = def.effective_timeout(self.default_timeout);
        let run_id = ctx.run_id;
        let started_at = Utc::now();
        let timer = SpanTimer::start(&def.name);

        self.sink.try_emit(
            STAGE_STARTED,
            Some(serde_json::json!({
                "run_id": run_id,
                "stage": &def.name,
                "capability": def.capability(),
                "timeout_ms": duration_ms(timeout),
            })),
        );
        debug!(stage = %def.name, timeout_ms = duration_ms(timeout), "Executing stage");

        let validator = Arc::clone(&def.validator);
        let mut handle = tokio::spawn(async move { validator.validate(&ctx).await });

        let outcome = match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(ValidatorError::Panicked(join_error_message(join_err))),
            Err(_) => {
                handle.abort();
                Err(ValidatorError::TimedOut {
                    stage: def.name.clone(),
                    timeout,
                })
            }
        };

        let elapsed = timer.elapsed_ms();
        let capability = def.capability();

        match outcome {
            Ok(payload) => {
                self.sink.try_emit(
                    STAGE_COMPLETED,
                    Some(serde_json::json!({
                        "run_id": run_id,
                        "stage": &def.name,
                        "duration_ms": elapsed,
                        "issues": payload.issues.len(),
                    })),
                );
                debug!(
                    stage = %def.name,
                    duration_ms = elapsed,
                    issues = payload.issues.len(),
                    "Stage completed"
                );
                StageResult::completed(
                    &def.name,
                    capability,
                    def.critical,
                    payload,
                    started_at,
                    elapsed,
                )
            }
            Err(err) => {
                let timed_out = err.is_timeout();
                self.sink.try_emit(
                    STAGE_FAILED,
                    Some(serde_json::json!({
                        "run_id": run_id,
                        "stage": &def.name,
                        "error": err.to_string(),
                        "timed_out": timed_out,
                        "duration_ms": elapsed,
                    })),
                );
                warn!(
                    stage = %def.name,
                    critical = def.critical,
                    error = %err,
                    duration_ms = elapsed,
                    "Stage failed"
                );
                let result = StageResult::failed(
                    &def.name,
                    capability,
                    def.critical,
                    err.to_string(),
                    started_at,
                    elapsed,
                );
                if timed_out {
                    result.with_timeout_flag()
                } else {
                    result
                }
            }
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn join_error_message(err: JoinError) -> String {
    if err.is_cancelled() {
        return "validator task was cancelled".to_string();
    }
    let panic = err.into_panic();
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ChangeDescriptor, Issue, Severity, StagePayload, StageStatus};
    use crate::events::CollectingEventSink;
    use crate::stages::{Capability, FnValidator, Validator};
    use crate::testing::{PanickingValidator, SlowValidator};
    use uuid::Uuid;

    fn ctx(stage: &str) -> ValidationContext {
        ValidationContext::new(
            Uuid::new_v4(),
            stage,
            serde_json::Value::Null,
            Arc::new(ChangeDescriptor::new("c1")),
        )
    }

    fn def(name: &str, validator: Arc<dyn Validator>) -> StageDefinition {
        StageDefinition::new(name, validator)
    }

    #[tokio::test]
    async fn test_completed_with_issues_is_still_completed() {
        let validator = Arc::new(FnValidator::new(Capability::Linting, |_| {
            Ok(StagePayload::new().with_issue(Issue::new(Severity::High, "unused variable")))
        }));
        let executor = StageExecutor::new(Duration::from_secs(5));

        let result = executor.execute(&def("linting", validator), ctx("linting")).await;

        assert_eq!(result.status, StageStatus::Completed);
        assert!(result.has_issues());
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn test_validator_error_is_failed() {
        let validator = Arc::new(FnValidator::new(Capability::UnitTests, |_| {
            Err(ValidatorError::failed("2 tests failed"))
        }));
        let sink = Arc::new(CollectingEventSink::new());
        let executor = StageExecutor::new(Duration::from_secs(5)).with_event_sink(sink.clone());

        let stage = def("unit_tests", validator).critical();
        let result = executor.execute(&stage, ctx("unit_tests")).await;

        assert_eq!(result.status, StageStatus::Failed);
        assert!(result.critical);
        assert_eq!(result.error.as_deref(), Some("2 tests failed"));
        assert!(!result.timed_out);
        assert_eq!(sink.stages_for(STAGE_STARTED), vec!["unit_tests"]);
        assert_eq!(sink.stages_for(STAGE_FAILED), vec!["unit_tests"]);
    }

    #[tokio::test]
    async fn test_timeout_enforced() {
        let validator = Arc::new(SlowValidator::new(
            Capability::PerformanceAnalysis,
            Duration::from_secs(5),
        ));
        let executor = StageExecutor::new(Duration::from_secs(300));
        let stage = def("performance_analysis", validator).with_timeout(Duration::from_millis(100));

        let result = executor.execute(&stage, ctx("performance_analysis")).await;

        assert_eq!(result.status, StageStatus::Failed);
        assert!(result.timed_out);
        assert!(result.error.as_deref().unwrap_or_default().contains("timed out"));
        assert!(result.duration_ms >= 100, "duration {}ms", result.duration_ms);
        assert!(result.duration_ms < 2000, "duration {}ms", result.duration_ms);
    }

    #[tokio::test]
    async fn test_panicking_validator_is_failed() {
        let validator =
            Arc::new(PanickingValidator::new(Capability::SyntaxCheck, "parser exploded"));
        let executor = StageExecutor::new(Duration::from_secs(5));

        let result = executor.execute(&def("syntax_check", validator), ctx("syntax_check")).await;

        assert_eq!(result.status, StageStatus::Failed);
        assert!(result.error.unwrap().contains("parser exploded"));
    }
}

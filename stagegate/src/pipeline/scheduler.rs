//! Dependency-ordered stage scheduling.
//!
//! Every stage is resolved through a per-run cache of shared futures: the
//! first caller that needs a stage creates its resolution and stores it,
//! every later caller (a second dependent, the top-level loop) awaits the
//! same handle. The check and the insert happen under one lock, so a stage
//! can never be started twice, no matter how many dependents race for it.

use super::{PipelineConfig, StageExecutor, StageGraph};
use crate::core::{ChangeDescriptor, StageStatus};
use crate::events::{EventSink, NoOpEventSink, PIPELINE_ABORTED, STAGE_SKIPPED};
use crate::observability::stage_span;
use crate::stages::{StageResult, ValidationContext};
use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

/// Counts of stage outcomes for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionMetrics {
    /// Stages in the graph.
    pub total: usize,
    /// Stages that completed.
    pub completed: usize,
    /// Stages that failed.
    pub failed: usize,
    /// Stages skipped because a dependency failed.
    pub skipped: usize,
    /// Stages never launched because the run was aborted.
    pub not_run: usize,
}

impl ExecutionMetrics {
    /// Tallies metrics from a result map.
    #[must_use]
    pub fn from_results(total: usize, results: &HashMap<String, StageResult>) -> Self {
        let mut metrics = Self {
            total,
            ..Self::default()
        };
        for result in results.values() {
            match result.status {
                StageStatus::Completed => metrics.completed += 1,
                StageStatus::Failed => metrics.failed += 1,
                StageStatus::Skipped => metrics.skipped += 1,
            }
        }
        metrics.not_run = total.saturating_sub(results.len());
        metrics
    }
}

/// Why a run stopped launching stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AbortReason {
    /// Too many stages failed.
    FailureThreshold {
        /// Stages that had failed when the threshold was crossed.
        failed_stages: Vec<String>,
        /// The configured threshold.
        threshold: usize,
    },
    /// The scheduler itself broke down.
    Internal {
        /// What went wrong.
        message: String,
    },
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FailureThreshold {
                failed_stages,
                threshold,
            } => write!(
                f,
                "Early termination: {} stage(s) failed (threshold {}): {}",
                failed_stages.len(),
                threshold,
                failed_stages.join(", ")
            ),
            Self::Internal { message } => write!(f, "Pipeline scheduling failed: {message}"),
        }
    }
}

/// Everything the scheduler produced for one run.
#[derive(Debug, Clone)]
pub struct ScheduleOutcome {
    /// Result per stage that reached a terminal state.
    pub results: HashMap<String, StageResult>,
    /// Outcome counts.
    pub metrics: ExecutionMetrics,
    /// Set when the run stopped launching stages.
    pub abort: Option<AbortReason>,
}

impl ScheduleOutcome {
    /// Returns true if the run was aborted.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.abort.is_some()
    }
}

/// Walks a [`StageGraph`] and drives the [`StageExecutor`] for every stage.
#[derive(Clone)]
pub struct Scheduler {
    config: PipelineConfig,
    executor: StageExecutor,
    sink: Arc<dyn EventSink>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.config)
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Creates a scheduler.
    #[must_use]
    pub fn new(config: PipelineConfig, executor: StageExecutor) -> Self {
        Self {
            config,
            executor,
            sink: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Runs every stage of the graph at most once.
    ///
    /// With parallel execution enabled, parallel-tagged stages are launched
    /// together first; sequential stages then run one at a time in
    /// declaration order. Otherwise every stage runs in declaration order.
    pub async fn run(
        &self,
        graph: Arc<StageGraph>,
        change: Arc<ChangeDescriptor>,
        run_id: Uuid,
    ) -> ScheduleOutcome {
        let state = Arc::new(RunState {
            run_id,
            graph,
            executor: self.executor.clone(),
            config: self.config.clone(),
            change,
            sink: Arc::clone(&self.sink),
            inflight: Mutex::new(HashMap::new()),
            book: Mutex::new(Bookkeeping::default()),
            aborted: AtomicBool::new(false),
            abort_reason: Mutex::new(None),
        });

        let driver = Arc::clone(&state);
        if let Err(err) = tokio::spawn(driver.drive_all()).await {
            let message = if err.is_panic() {
                "scheduler task panicked".to_string()
            } else {
                err.to_string()
            };
            state.abort(AbortReason::Internal { message });
        }

        state.finish()
    }
}

type Resolution = Shared<BoxFuture<'static, Option<StageStatus>>>;

#[derive(Debug, Default)]
struct Bookkeeping {
    /// Terminal results; the key set is the executed set and only grows.
    results: HashMap<String, StageResult>,
    /// Failed stages in failure order.
    failed: Vec<String>,
}

/// State scoped to a single run. Nothing here outlives the run.
struct RunState {
    run_id: Uuid,
    graph: Arc<StageGraph>,
    executor: StageExecutor,
    config: PipelineConfig,
    change: Arc<ChangeDescriptor>,
    sink: Arc<dyn EventSink>,
    /// In-flight and finished resolutions by stage name.
    inflight: Mutex<HashMap<String, Resolution>>,
    book: Mutex<Bookkeeping>,
    aborted: AtomicBool,
    abort_reason: Mutex<Option<AbortReason>>,
}

impl RunState {
    async fn drive_all(self: Arc<Self>) {
        let (parallel, sequential): (Vec<String>, Vec<String>) =
            if self.config.enable_parallel_execution {
                let (parallel, sequential): (Vec<_>, Vec<_>) =
                    self.graph.all_stages().partition(|d| d.parallel);
                (
                    parallel.into_iter().map(|d| d.name.clone()).collect(),
                    sequential.into_iter().map(|d| d.name.clone()).collect(),
                )
            } else {
                (Vec::new(), self.graph.declaration_order().to_vec())
            };

        let launched: Vec<Resolution> = parallel.iter().map(|name| self.resolve(name)).collect();
        join_all(launched).await;

        for name in &sequential {
            if self.is_aborted() {
                break;
            }
            self.resolve(name).await;
        }
    }

    /// Returns the shared resolution for a stage, creating it on first use.
    fn resolve(self: &Arc<Self>, name: &str) -> Resolution {
        let mut inflight = self.inflight.lock();
        if let Some(existing) = inflight.get(name) {
            return existing.clone();
        }
        let resolution = Arc::clone(self).drive(name.to_string()).shared();
        inflight.insert(name.to_string(), resolution.clone());
        resolution
    }

    /// Resolves dependencies, then skips or executes the stage.
    ///
    /// Yields `None` when the stage was never launched.
    fn drive(self: Arc<Self>, name: String) -> BoxFuture<'static, Option<StageStatus>> {
        async move {
            let def = Arc::clone(self.graph.stage(&name)?);

            let pending: Vec<Resolution> =
                def.dependencies.iter().map(|dep| self.resolve(dep)).collect();
            let statuses = join_all(pending).await;

            if self.is_aborted() {
                return None;
            }

            if def.critical {
                let failed_dep = def
                    .dependencies
                    .iter()
                    .zip(&statuses)
                    .find(|(_, status)| **status == Some(StageStatus::Failed))
                    .map(|(dep, _)| dep.clone());

                if let Some(dep) = failed_dep {
                    let reason = format!("dependency '{dep}' failed");
                    info!(run_id = %self.run_id, stage = %name, %reason, "Skipping stage");
                    self.sink.try_emit(
                        STAGE_SKIPPED,
                        Some(serde_json::json!({
                            "run_id": self.run_id,
                            "stage": &name,
                            "reason": &reason,
                        })),
                    );
                    self.record(StageResult::skipped(&name, def.capability(), true, reason));
                    return Some(StageStatus::Skipped);
                }
            }

            let ctx = ValidationContext::new(
                self.run_id,
                &name,
                def.config.clone(),
                Arc::clone(&self.change),
            );
            let span = stage_span(self.run_id, &name, def.critical);
            let result = self.executor.execute(&def, ctx).instrument(span).await;
            let status = result.status;
            self.record(result);
            Some(status)
        }
        .boxed()
    }

    fn record(&self, result: StageResult) {
        let status = result.status;
        let failed = {
            let mut book = self.book.lock();
            if status == StageStatus::Failed {
                book.failed.push(result.stage.clone());
            }
            book.results.insert(result.stage.clone(), result);
            book.failed.clone()
        };

        if status != StageStatus::Skipped && self.config.should_terminate(failed.len()) {
            self.abort(AbortReason::FailureThreshold {
                failed_stages: failed,
                threshold: self.config.critical_failure_threshold,
            });
        }
    }

    fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Stops further launches. Only the first reason is kept.
    fn abort(&self, reason: AbortReason) {
        if self
            .aborted
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        warn!(run_id = %self.run_id, reason = %reason, "Pipeline aborted");
        self.sink.try_emit(
            PIPELINE_ABORTED,
            Some(serde_json::json!({
                "run_id": self.run_id,
                "reason": reason.to_string(),
            })),
        );
        *self.abort_reason.lock() = Some(reason);
    }

    fn finish(&self) -> ScheduleOutcome {
        // Unfinished resolutions hold an `Arc` back to this state.
        self.inflight.lock().clear();
        let results = std::mem::take(&mut self.book.lock().results);
        let metrics = ExecutionMetrics::from_results(self.graph.stage_count(), &results);
        ScheduleOutcome {
            results,
            metrics,
            abort: self.abort_reason.lock().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StagePayload;
    use crate::pipeline::StageDefinition;
    use crate::stages::{Capability, Validator};
    use crate::testing::{CountingValidator, FailingValidator, SlowValidator, StaticValidator};
    use std::time::Duration;

    fn ok(capability: Capability) -> Arc<dyn Validator> {
        Arc::new(StaticValidator::new(capability, StagePayload::new()))
    }

    fn failing(capability: Capability) -> Arc<dyn Validator> {
        Arc::new(FailingValidator::new(capability, "boom"))
    }

    async fn run(defs: Vec<StageDefinition>, config: PipelineConfig) -> ScheduleOutcome {
        let graph = Arc::new(StageGraph::build(defs).unwrap());
        let executor = StageExecutor::new(config.stage_timeout());
        Scheduler::new(config, executor)
            .run(graph, Arc::new(ChangeDescriptor::new("c1")), Uuid::new_v4())
            .await
    }

    #[tokio::test]
    async fn test_diamond_runs_shared_dependency_once() {
        let base = Arc::new(CountingValidator::new(Capability::SyntaxCheck));
        let defs = vec![
            StageDefinition::new("syntax_check", base.clone()).parallel(),
            StageDefinition::new("linting", ok(Capability::Linting))
                .parallel()
                .with_dependency("syntax_check"),
            StageDefinition::new("type_check", ok(Capability::TypeCheck))
                .parallel()
                .with_dependency("syntax_check"),
            StageDefinition::new("unit_tests", ok(Capability::UnitTests))
                .with_dependencies(["linting", "type_check", "syntax_check"]),
        ];

        let outcome = run(defs, PipelineConfig::default()).await;

        assert_eq!(base.call_count(), 1);
        assert_eq!(outcome.results.len(), 4);
        assert_eq!(outcome.metrics.completed, 4);
        assert!(!outcome.is_aborted());
    }

    #[tokio::test]
    async fn test_critical_dependent_is_skipped() {
        let tests = Arc::new(CountingValidator::new(Capability::UnitTests));
        let defs = vec![
            StageDefinition::new("syntax_check", failing(Capability::SyntaxCheck)).critical(),
            StageDefinition::new("unit_tests", tests.clone())
                .critical()
                .with_dependency("syntax_check"),
        ];

        let outcome = run(defs, PipelineConfig::default()).await;

        let skipped = &outcome.results["unit_tests"];
        assert_eq!(skipped.status, StageStatus::Skipped);
        assert_eq!(skipped.skip_reason.as_deref(), Some("dependency 'syntax_check' failed"));
        assert_eq!(tests.call_count(), 0);
        assert_eq!(outcome.metrics.skipped, 1);
        assert_eq!(outcome.metrics.failed, 1);
    }

    #[tokio::test]
    async fn test_non_critical_dependent_still_runs() {
        let lint = Arc::new(CountingValidator::new(Capability::Linting));
        let defs = vec![
            StageDefinition::new("syntax_check", failing(Capability::SyntaxCheck)).critical(),
            StageDefinition::new("linting", lint.clone()).with_dependency("syntax_check"),
        ];

        let outcome = run(defs, PipelineConfig::default()).await;

        assert_eq!(outcome.results["linting"].status, StageStatus::Completed);
        assert_eq!(lint.call_count(), 1);
    }

    #[tokio::test]
    async fn test_sequential_stages_run_in_declaration_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let defs: Vec<StageDefinition> = ["c", "a", "b"]
            .iter()
            .map(|name| {
                let validator =
                    CountingValidator::recording(Capability::Linting, *name, order.clone());
                let validator = Arc::new(validator);
                StageDefinition::new(*name, validator)
            })
            .collect();

        run(defs, PipelineConfig::default()).await;

        assert_eq!(*order.lock(), vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn test_sequential_stage_pulls_in_dependency_first() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let recording = |name: &str| -> Arc<dyn Validator> {
            Arc::new(CountingValidator::recording(Capability::Linting, name, order.clone()))
        };
        let defs = vec![
            StageDefinition::new("report", recording("report")).with_dependency("analysis"),
            StageDefinition::new("analysis", recording("analysis")),
        ];

        run(defs, PipelineConfig::default().with_parallel_execution(false)).await;

        assert_eq!(*order.lock(), vec!["analysis", "report"]);
    }

    #[tokio::test]
    async fn test_early_termination_stops_new_launches() {
        let later = Arc::new(CountingValidator::new(Capability::Linting));
        let mut defs = vec![
            StageDefinition::new("s1", failing(Capability::UnitTests)),
            StageDefinition::new("s2", failing(Capability::UnitTests)),
        ];
        for name in ["s3", "s4", "s5"] {
            defs.push(StageDefinition::new(name, later.clone()));
        }

        let outcome = run(defs, PipelineConfig::default().with_failure_threshold(2)).await;

        assert_eq!(later.call_count(), 0);
        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.metrics.not_run, 3);
        assert!(matches!(
            outcome.abort,
            Some(AbortReason::FailureThreshold { threshold: 2, ref failed_stages })
                if failed_stages.len() == 2
        ));
    }

    #[tokio::test]
    async fn test_early_termination_lets_in_flight_stages_finish() {
        let slow: Arc<dyn Validator> = Arc::new(SlowValidator::new(
            Capability::PerformanceAnalysis,
            Duration::from_millis(50),
        ));
        let defs = vec![
            StageDefinition::new("s1", failing(Capability::UnitTests)).parallel(),
            StageDefinition::new("s2", failing(Capability::UnitTests)).parallel(),
            StageDefinition::new("s3", slow.clone()).parallel(),
            StageDefinition::new("s4", slow).parallel(),
            StageDefinition::new("s5", ok(Capability::Linting)),
        ];

        let outcome = run(defs, PipelineConfig::default().with_failure_threshold(2)).await;

        assert!(outcome.is_aborted());
        assert_eq!(outcome.results["s3"].status, StageStatus::Completed);
        assert_eq!(outcome.results["s4"].status, StageStatus::Completed);
        assert!(!outcome.results.contains_key("s5"));
    }

    #[tokio::test]
    async fn test_early_termination_disabled() {
        let defs = (1..=4)
            .map(|i| StageDefinition::new(format!("s{i}"), failing(Capability::UnitTests)))
            .collect();

        let outcome = run(
            defs,
            PipelineConfig::default().with_failure_threshold(1).with_early_termination(false),
        )
        .await;

        assert!(!outcome.is_aborted());
        assert_eq!(outcome.metrics.failed, 4);
    }

    #[test]
    fn test_abort_reason_display() {
        let reason = AbortReason::FailureThreshold {
            failed_stages: vec!["a".into(), "b".into()],
            threshold: 2,
        };
        assert_eq!(reason.to_string(), "Early termination: 2 stage(s) failed (threshold 2): a, b");
    }
}

//! Pipeline entry point.

use super::{PipelineConfig, Scheduler, StageDefinition, StageExecutor, StageGraph};
use crate::core::ChangeDescriptor;
use crate::diagnostics::ErrorContextBuilder;
use crate::errors::StagegateError;
use crate::events::{EventSink, NoOpEventSink, PIPELINE_COMPLETED, PIPELINE_STARTED};
use crate::report::{PipelineResult, ResultAggregator};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

/// A validated pipeline, ready to run against changes.
///
/// The graph and configuration are fixed at construction; every call to
/// [`run`](Self::run) is an independent run with its own bookkeeping.
#[derive(Clone)]
pub struct ValidationPipeline {
    graph: Arc<StageGraph>,
    config: PipelineConfig,
    sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for ValidationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationPipeline")
            .field("stages", &self.graph.declaration_order())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ValidationPipeline {
    /// Builds a pipeline from stage definitions.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the stage graph
    /// fails validation.
    pub fn new(
        definitions: impl IntoIterator<Item = StageDefinition>,
        config: PipelineConfig,
    ) -> Result<Self, StagegateError> {
        config.validate()?;
        let graph = StageGraph::build(definitions)?;
        Ok(Self {
            graph: Arc::new(graph),
            config,
            sink: Arc::new(NoOpEventSink),
        })
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Returns the stage graph.
    #[must_use]
    pub fn graph(&self) -> &StageGraph {
        &self.graph
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs every stage against a change and reports the outcome.
    pub async fn run(&self, change: ChangeDescriptor) -> PipelineResult {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("pipeline_run", %run_id, change_id = %change.change_id);
        self.run_with_id(run_id, Arc::new(change)).instrument(span).await
    }

    async fn run_with_id(&self, run_id: Uuid, change: Arc<ChangeDescriptor>) -> PipelineResult {
        let started_at = Utc::now();
        info!(stages = self.graph.stage_count(), "Pipeline started");
        self.sink
            .emit(
                PIPELINE_STARTED,
                Some(serde_json::json!({
                    "run_id": run_id,
                    "change_id": &change.change_id,
                    "stages": self.graph.declaration_order(),
                })),
            )
            .await;

        let executor = StageExecutor::new(self.config.stage_timeout())
            .with_event_sink(Arc::clone(&self.sink));
        let outcome = Scheduler::new(self.config.clone(), executor)
            .with_event_sink(Arc::clone(&self.sink))
            .run(Arc::clone(&self.graph), Arc::clone(&change), run_id)
            .await;

        let aggregate = ResultAggregator::for_graph(&self.graph)
            .aggregate(&outcome.results, &outcome.metrics);
        let contexts = ErrorContextBuilder::new(run_id, change);

        let error_contexts = if self.config.enable_error_context_generation {
            contexts.build_all(self.graph.declaration_order(), &outcome.results)
        } else {
            Vec::new()
        };

        let mut result = PipelineResult::from_aggregate(
            run_id,
            aggregate,
            outcome.results,
            outcome.metrics,
            started_at,
        )
        .with_error_contexts(error_contexts);
        if let Some(reason) = &outcome.abort {
            result = result.with_pipeline_error(contexts.build_pipeline_error(reason.to_string()));
        }

        info!(
            status = %result.overall_status,
            score = result.overall_score,
            grade = %result.grade,
            completed = result.execution_metrics.completed,
            failed = result.execution_metrics.failed,
            skipped = result.execution_metrics.skipped,
            not_run = result.execution_metrics.not_run,
            duration_ms = result.duration_ms,
            "Pipeline completed"
        );
        self.sink
            .emit(
                PIPELINE_COMPLETED,
                Some(serde_json::json!({
                    "run_id": run_id,
                    "status": result.overall_status,
                    "score": result.overall_score,
                    "grade": result.grade,
                    "duration_ms": result.duration_ms,
                })),
            )
            .await;

        result
    }
}

/// Builds a pipeline and runs it once.
///
/// Never fails: an invalid stage graph or configuration yields a result
/// with `overall_status = error` and no stage results.
pub async fn run_validation(
    definitions: impl IntoIterator<Item = StageDefinition>,
    change: ChangeDescriptor,
    config: PipelineConfig,
) -> PipelineResult {
    let started_at = Utc::now();
    match ValidationPipeline::new(definitions, config) {
        Ok(pipeline) => pipeline.run(change).await,
        Err(err) => {
            warn!(error = %err, "Pipeline rejected before execution");
            let run_id = Uuid::new_v4();
            let contexts = ErrorContextBuilder::new(run_id, Arc::new(change));
            let context = match &err {
                StagegateError::Graph(graph_err) => contexts.build_graph_error(graph_err),
                other => contexts.build_pipeline_error(other.to_string()),
            };
            PipelineResult::not_started(run_id, context, started_at)
        }
    }
}

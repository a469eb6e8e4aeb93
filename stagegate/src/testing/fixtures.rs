//! Test fixtures for pipeline testing.

use std::sync::Arc;

use super::StaticValidator;
use crate::core::ChangeDescriptor;
use crate::errors::StagegateError;
use crate::events::CollectingEventSink;
use crate::pipeline::{PipelineConfig, StageDefinition, StageManifest, ValidationPipeline};
use crate::report::PipelineResult;
use crate::stages::{Capability, ValidatorRegistry};

/// A change touching a couple of files.
#[must_use]
pub fn sample_change() -> ChangeDescriptor {
    ChangeDescriptor::new("change-1")
        .with_task_id("TASK-1")
        .with_title("Add retry budget to the uploader")
        .with_author("dev@example.com")
        .with_branch("feature/retry-budget")
        .with_files(["src/uploader.rs", "src/budget.rs"])
}

/// A registry with a clean [`StaticValidator`] for every capability.
#[must_use]
pub fn clean_registry() -> ValidatorRegistry {
    let mut registry = ValidatorRegistry::new();
    for capability in Capability::ALL {
        registry.register(Arc::new(StaticValidator::clean(capability)));
    }
    registry
}

/// Manifests for the usual seven validation stages.
///
/// Syntax checking gates everything else; linting and type checking run in
/// parallel after it; unit tests need both; integration tests need unit
/// tests; security and performance analysis are independent.
#[must_use]
pub fn standard_manifests() -> Vec<StageManifest> {
    let manifest = |name: &str,
                    capability: Capability,
                    parallel: bool,
                    critical: bool,
                    deps: &[&str]| {
        StageManifest {
            name: name.to_string(),
            capability,
            config: serde_json::Value::Null,
            parallel,
            critical,
            timeout_seconds: None,
            timeout_multiplier: 1.0,
            dependencies: deps.iter().map(|d| (*d).to_string()).collect(),
        }
    };

    vec![
        manifest("syntax_check", Capability::SyntaxCheck, false, true, &[]),
        manifest("linting", Capability::Linting, true, false, &["syntax_check"]),
        manifest("type_check", Capability::TypeCheck, true, false, &["syntax_check"]),
        manifest("unit_tests", Capability::UnitTests, false, true, &["linting", "type_check"]),
        manifest("integration_tests", Capability::IntegrationTests, false, true, &["unit_tests"]),
        manifest("security_scan", Capability::SecurityScan, true, true, &[]),
        manifest("performance_analysis", Capability::PerformanceAnalysis, true, false, &[]),
    ]
}

/// Binds [`standard_manifests`] against a registry.
///
/// # Errors
///
/// Returns an error if a capability has no validator.
pub fn standard_stages(
    registry: &ValidatorRegistry,
) -> Result<Vec<StageDefinition>, StagegateError> {
    StageManifest::bind_all(standard_manifests(), registry)
}

/// A pipeline harness that records every event it emits.
pub struct TestPipeline {
    /// Stages to run.
    pub stages: Vec<StageDefinition>,
    /// Pipeline configuration.
    pub config: PipelineConfig,
    /// Collected events.
    pub events: Arc<CollectingEventSink>,
}

impl TestPipeline {
    /// Creates an empty harness with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            config: PipelineConfig::default(),
            events: Arc::new(CollectingEventSink::new()),
        }
    }

    /// Adds a stage.
    #[must_use]
    pub fn stage(mut self, definition: StageDefinition) -> Self {
        self.stages.push(definition);
        self
    }

    /// Sets the configuration.
    #[must_use]
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the stage graph is invalid.
    pub fn build(&self) -> Result<ValidationPipeline, StagegateError> {
        let pipeline = ValidationPipeline::new(self.stages.clone(), self.config.clone())?;
        Ok(pipeline.with_event_sink(self.events.clone()))
    }

    /// Builds and runs the pipeline against [`sample_change`].
    ///
    /// # Errors
    ///
    /// Returns an error if the stage graph is invalid.
    pub async fn run(&self) -> Result<PipelineResult, StagegateError> {
        Ok(self.build()?.run(sample_change()).await)
    }
}

impl Default for TestPipeline {
    fn default() -> Self {
        Self::new()
    }
}

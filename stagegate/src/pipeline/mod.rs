//! Pipeline definition, scheduling and execution.
//!
//! This module provides:
//! - Stage definitions and manifests
//! - The validated stage graph
//! - The per-stage executor and the dependency-ordered scheduler
//! - The [`ValidationPipeline`] entry point

mod config;
mod executor;
mod graph;
mod runner;
mod scheduler;
mod spec;


pub use config::PipelineConfig;
pub use executor::StageExecutor;
pub use graph::StageGraph;
pub use runner::{run_validation, ValidationPipeline};
pub use scheduler::{AbortReason, ExecutionMetrics, ScheduleOutcome, Scheduler};
pub use spec::{StageDefinition, StageManifest};

//! # Stagegate
//!
//! Stage scheduling and result aggregation for multi-stage code validation
//! pipelines.
//!
//! A pipeline is a set of named stages (syntax check, linting, type check,
//! tests, security scan, performance analysis, ...) with dependencies
//! between them. Stagegate provides:
//!
//! - **Graph validation**: duplicate names, unknown dependencies and cycles
//!   are rejected before anything runs
//! - **Dependency-ordered scheduling**: every stage runs at most once, even
//!   when many dependents need it concurrently
//! - **Critical skip propagation**: a critical stage whose dependency failed
//!   is skipped instead of executed
//! - **Per-stage deadlines and early termination**
//! - **Aggregation**: one scored, graded [`PipelineResult`](report::PipelineResult)
//!   with structured error contexts for everything that went wrong
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stagegate::prelude::*;
//!
//! let stages = vec![
//!     StageDefinition::new("syntax_check", syntax).critical(),
//!     StageDefinition::new("linting", linter).parallel().with_dependency("syntax_check"),
//!     StageDefinition::new("unit_tests", tests).critical().with_dependency("syntax_check"),
//! ];
//!
//! let change = ChangeDescriptor::new("abc123");
//! let result = run_validation(stages, change, PipelineConfig::default()).await;
//! println!("{} ({})", result.overall_status, result.grade);
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, missing_docs, rust_2018_idioms)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod core;
pub mod diagnostics;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod report;
pub mod stages;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::core::{
        ChangeDescriptor, Grade, Issue, OverallStatus, QualityGate, ResourceMetrics,
        SecurityFinding, Severity, StagePayload, StageStatus,
    };
    pub use crate::diagnostics::{Classification, ErrorContext, FixPriority};
    pub use crate::errors::{GraphError, StagegateError, ValidatorError};
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::pipeline::{
        run_validation, PipelineConfig, StageDefinition, StageManifest, ValidationPipeline,
    };
    pub use crate::report::PipelineResult;
    pub use crate::stages::{
        Capability, FnValidator, StageResult, ValidationContext, Validator, ValidatorRegistry,
    };
}

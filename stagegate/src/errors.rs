//! Error types for the stagegate engine.
//!
//! Configuration problems in the stage graph are reported through
//! [`GraphError`]; failures raised by validators through [`ValidatorError`].
//! Neither ever escapes a pipeline run: the scheduler folds them into
//! stage results or a pipeline-level error context.

use crate::stages::Capability;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// The main error type for stagegate operations.
#[derive(Debug, Error)]
pub enum StagegateError {
    /// The stage graph failed validation.
    #[error("{0}")]
    Graph(#[from] GraphError),

    /// The pipeline configuration could not be parsed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A stage manifest names a capability with no registered validator.
    #[error("No validator registered for capability '{capability}' (stage '{stage}')")]
    MissingValidator {
        /// The stage being bound.
        stage: String,
        /// The capability without a validator.
        capability: Capability,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Metadata about a contract error for better diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "GRAPH-CYCLE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when a stage graph is malformed.
///
/// These are configuration errors: they are reported before any stage runs
/// and are never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// The pipeline has no stages at all.
    #[error("Pipeline has no stages")]
    Empty,

    /// Two stage definitions share a name.
    #[error("Duplicate stage '{stage}'")]
    DuplicateStage {
        /// The repeated stage name.
        stage: String,
    },

    /// A stage lists itself as a dependency.
    #[error("Stage '{stage}' cannot depend on itself")]
    SelfDependency {
        /// The offending stage.
        stage: String,
    },

    /// A stage depends on a name that is not in the graph.
    #[error("Stage '{stage}' depends on unknown stage '{dependency}'")]
    UnknownDependency {
        /// The stage declaring the dependency.
        stage: String,
        /// The missing dependency name.
        dependency: String,
    },

    /// The dependency relation contains a cycle.
    #[error("Cycle detected in pipeline: {}", cycle_path.join(" -> "))]
    CyclicDependency {
        /// The stages forming the cycle; first and last entries are equal.
        cycle_path: Vec<String>,
    },
}

impl GraphError {
    /// Returns the stable error code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Empty => "GRAPH-EMPTY",
            Self::DuplicateStage { .. } => "GRAPH-DUPLICATE",
            Self::SelfDependency { .. } => "GRAPH-SELF_DEP",
            Self::UnknownDependency { .. } => "GRAPH-MISSING_DEP",
            Self::CyclicDependency { .. } => "GRAPH-CYCLE",
        }
    }

    /// Returns the stages involved in the error.
    #[must_use]
    pub fn stages(&self) -> Vec<String> {
        match self {
            Self::Empty => Vec::new(),
            Self::DuplicateStage { stage } | Self::SelfDependency { stage } => vec![stage.clone()],
            Self::UnknownDependency { stage, dependency } => {
                vec![stage.clone(), dependency.clone()]
            }
            Self::CyclicDependency { cycle_path } => cycle_path.clone(),
        }
    }

    /// Builds the diagnostic info for this error.
    #[must_use]
    pub fn error_info(&self) -> ContractErrorInfo {
        let hint = match self {
            Self::Empty => "Add at least one stage to the pipeline before running it.",
            Self::DuplicateStage { .. } => "Rename one of the stages; stage names must be unique.",
            Self::SelfDependency { .. } => "Remove the self-reference from the dependency list.",
            Self::UnknownDependency { .. } => {
                "Ensure the dependency is part of the pipeline or remove it. \
                 Check for typos in stage names."
            }
            Self::CyclicDependency { .. } => {
                "Remove one of the dependencies in the cycle to break it."
            }
        };

        let mut info = ContractErrorInfo::new(self.code(), self.to_string()).with_fix_hint(hint);
        let stages = self.stages();
        if !stages.is_empty() {
            info = info.with_context_entry("stages", stages.join(","));
        }
        info
    }
}

/// Error raised by a validator while checking a change.
#[derive(Debug, Clone, Error)]
pub enum ValidatorError {
    /// The validator reported a failure.
    #[error("{0}")]
    Failed(String),

    /// The validator did not settle before its deadline.
    #[error("Stage '{stage}' timed out after {}ms", timeout.as_millis())]
    TimedOut {
        /// The stage that timed out.
        stage: String,
        /// The deadline that was exceeded.
        timeout: Duration,
    },

    /// The validator panicked.
    #[error("Validator panicked: {0}")]
    Panicked(String),
}

impl ValidatorError {
    /// Creates a failure error.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Returns true if the error is a timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }
}

impl From<anyhow::Error> for ValidatorError {
    fn from(err: anyhow::Error) -> Self {
        Self::Failed(format!("{err:#}"))
    }
}

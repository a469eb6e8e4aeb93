//! Validator trait and capability tags.
//!
//! Validators are the external collaborators that actually inspect a
//! change. The engine only knows them through the [`Validator`] trait and
//! the closed [`Capability`] set.

mod registry;
mod result;

pub use registry::ValidatorRegistry;
pub use result::StageResult;

use crate::core::{ChangeDescriptor, StagePayload};
use crate::errors::ValidatorError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};
use std::sync::Arc;
use uuid::Uuid;

/// The kind of check a stage performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Parse the changed sources.
    SyntaxCheck,
    /// Run linters.
    Linting,
    /// Run the type checker.
    TypeCheck,
    /// Run unit tests.
    UnitTests,
    /// Run integration tests.
    IntegrationTests,
    /// Scan for vulnerabilities and leaked secrets.
    SecurityScan,
    /// Analyse performance characteristics.
    PerformanceAnalysis,
}

impl Capability {
    /// All capabilities, in the order a typical pipeline declares them.
    pub const ALL: [Self; 7] = [
        Self::SyntaxCheck,
        Self::Linting,
        Self::TypeCheck,
        Self::UnitTests,
        Self::IntegrationTests,
        Self::SecurityScan,
        Self::PerformanceAnalysis,
    ];

    /// Returns the conventional stage name for this capability.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SyntaxCheck => "syntax_check",
            Self::Linting => "linting",
            Self::TypeCheck => "type_check",
            Self::UnitTests => "unit_tests",
            Self::IntegrationTests => "integration_tests",
            Self::SecurityScan => "security_scan",
            Self::PerformanceAnalysis => "performance_analysis",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a validator gets to see for one stage invocation.
#[derive(Debug, Clone)]
pub struct ValidationContext {
    /// The pipeline run id.
    pub run_id: Uuid,
    /// The stage being executed.
    pub stage: String,
    /// Stage specific configuration.
    pub config: serde_json::Value,
    /// The change under validation.
    pub change: Arc<ChangeDescriptor>,
}

impl ValidationContext {
    /// Creates a new validation context.
    #[must_use]
    pub fn new(
        run_id: Uuid,
        stage: impl Into<String>,
        config: serde_json::Value,
        change: Arc<ChangeDescriptor>,
    ) -> Self {
        Self {
            run_id,
            stage: stage.into(),
            config,
            change,
        }
    }

    /// Reads a config value by key.
    #[must_use]
    pub fn config_value(&self, key: &str) -> Option<&serde_json::Value> {
        self.config.get(key)
    }
}

/// Trait for validators.
///
/// A validator that settles with `Ok` marks its stage `completed`, even when
/// the payload carries issues. Returning `Err` marks the stage `failed`.
#[async_trait]
pub trait Validator: Send + Sync + Debug {
    /// Returns the capability this validator provides.
    fn capability(&self) -> Capability;

    /// Validates the change.
    async fn validate(&self, ctx: &ValidationContext) -> Result<StagePayload, ValidatorError>;
}

/// A simple function-based validator.
pub struct FnValidator<F>
where
    F: Fn(&ValidationContext) -> Result<StagePayload, ValidatorError> + Send + Sync,
{
    capability: Capability,
    func: F,
}

impl<F> FnValidator<F>
where
    F: Fn(&ValidationContext) -> Result<StagePayload, ValidatorError> + Send + Sync,
{
    /// Creates a new function-based validator.
    pub fn new(capability: Capability, func: F) -> Self {
        Self { capability, func }
    }
}

impl<F> Debug for FnValidator<F>
where
    F: Fn(&ValidationContext) -> Result<StagePayload, ValidatorError> + Send + Sync,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnValidator")
            .field("capability", &self.capability)
            .finish()
    }
}

#[async_trait]
impl<F> Validator for FnValidator<F>
where
    F: Fn(&ValidationContext) -> Result<StagePayload, ValidatorError> + Send + Sync,
{
    fn capability(&self) -> Capability {
        self.capability
    }

    async fn validate(&self, ctx: &ValidationContext) -> Result<StagePayload, ValidatorError> {
        (self.func)(ctx)
    }
}

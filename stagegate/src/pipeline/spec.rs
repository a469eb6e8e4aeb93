//! Stage definitions and their serializable manifests.

use crate::errors::StagegateError;
use crate::stages::{Capability, Validator, ValidatorRegistry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Definition of a single stage in a pipeline.
///
/// Definitions are fixed before a run starts and are read-only while it
/// executes.
#[derive(Debug, Clone)]
pub struct StageDefinition {
    /// The unique name of the stage.
    pub name: String,
    /// The validator implementation.
    pub validator: Arc<dyn Validator>,
    /// Configuration handed to the validator.
    pub config: serde_json::Value,
    /// Whether the stage may run concurrently with other parallel stages.
    pub parallel: bool,
    /// Whether a failure here skips critical dependents and should fail the run.
    pub critical: bool,
    /// Explicit deadline; falls back to the pipeline default when unset.
    pub timeout: Option<Duration>,
    /// Multiplier applied to the pipeline default deadline.
    pub timeout_multiplier: f64,
    /// Names of stages this stage depends on, in declaration order.
    pub dependencies: Vec<String>,
}

impl StageDefinition {
    /// Creates a new sequential, non-critical stage definition.
    #[must_use]
    pub fn new(name: impl Into<String>, validator: Arc<dyn Validator>) -> Self {
        Self {
            name: name.into(),
            validator,
            config: serde_json::Value::Null,
            parallel: false,
            critical: false,
            timeout: None,
            timeout_multiplier: 1.0,
            dependencies: Vec::new(),
        }
    }

    /// Returns the capability of the stage's validator.
    #[must_use]
    pub fn capability(&self) -> Capability {
        self.validator.capability()
    }

    /// Sets the dependencies. Duplicates are dropped, first occurrence wins.
    #[must_use]
    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.dependencies.clear();
        for dep in deps {
            self = self.with_dependency(dep);
        }
        self
    }

    /// Adds a dependency.
    #[must_use]
    pub fn with_dependency(mut self, dep: impl Into<String>) -> Self {
        let dep = dep.into();
        if !self.dependencies.contains(&dep) {
            self.dependencies.push(dep);
        }
        self
    }

    /// Sets the validator configuration.
    #[must_use]
    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }

    /// Marks the stage as eligible for concurrent execution.
    #[must_use]
    pub fn parallel(mut self) -> Self {
        self.parallel = true;
        self
    }

    /// Marks the stage as critical.
    #[must_use]
    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    /// Sets an explicit deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the multiplier applied to the pipeline default deadline.
    #[must_use]
    pub fn with_timeout_multiplier(mut self, multiplier: f64) -> Self {
        self.timeout_multiplier = multiplier;
        self
    }

    /// Returns the deadline for this stage given the pipeline default.
    #[must_use]
    pub fn effective_timeout(&self, default: Duration) -> Duration {
        self.timeout.unwrap_or_else(|| {
            if self.timeout_multiplier > 0.0 {
                Duration::try_from_secs_f64(default.as_secs_f64() * self.timeout_multiplier)
                    .unwrap_or(default)
            } else {
                default
            }
        })
    }
}

/// Serializable form of a [`StageDefinition`].
///
/// Manifests name a capability instead of holding a validator; binding
/// them against a [`ValidatorRegistry`] yields runnable definitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageManifest {
    /// The unique name of the stage.
    pub name: String,
    /// The capability to invoke.
    pub capability: Capability,
    /// Configuration handed to the validator.
    #[serde(default)]
    pub config: serde_json::Value,
    /// Whether the stage may run concurrently.
    #[serde(default)]
    pub parallel: bool,
    /// Whether the stage is critical.
    #[serde(default)]
    pub critical: bool,
    /// Explicit deadline in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<f64>,
    /// Multiplier applied to the pipeline default deadline.
    #[serde(default = "default_multiplier")]
    pub timeout_multiplier: f64,
    /// Names of stages this stage depends on.
    #[serde(default)]
    pub dependencies: Vec<String>,
}

fn default_multiplier() -> f64 {
    1.0
}

impl StageManifest {
    /// Binds the manifest to a validator from the registry.
    ///
    /// # Errors
    ///
    /// Returns an error if no validator is registered for the capability.
    pub fn bind(self, registry: &ValidatorRegistry) -> Result<StageDefinition, StagegateError> {
        let validator = registry
            .get(self.capability)
            .ok_or_else(|| StagegateError::MissingValidator {
                stage: self.name.clone(),
                capability: self.capability,
            })?;

        let timeout = match self.timeout_seconds {
            Some(seconds) => Some(
                Duration::try_from_secs_f64(seconds)
                    .ok()
                    .filter(|t| !t.is_zero())
                    .ok_or_else(|| {
                        StagegateError::Config(format!(
                            "stage '{}': timeout_seconds must be a positive duration, \
                             got {seconds}",
                            self.name
                        ))
                    })?,
            ),
            None => None,
        };

        let mut definition = StageDefinition::new(self.name, validator)
            .with_config(self.config)
            .with_dependencies(self.dependencies)
            .with_timeout_multiplier(self.timeout_multiplier);
        definition.parallel = self.parallel;
        definition.critical = self.critical;
        definition.timeout = timeout;
        Ok(definition)
    }

    /// Binds a list of manifests, preserving declaration order.
    ///
    /// # Errors
    ///
    /// Returns the first binding error.
    pub fn bind_all(
        manifests: Vec<Self>,
        registry: &ValidatorRegistry,
    ) -> Result<Vec<StageDefinition>, StagegateError> {
        manifests.into_iter().map(|m| m.bind(registry)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StagePayload;
    use crate::stages::FnValidator;

    fn validator(capability: Capability) -> Arc<dyn Validator> {
        Arc::new(FnValidator::new(capability, |_| Ok(StagePayload::new())))
    }

    #[test]
    fn test_stage_definition_creation() {
        let def = StageDefinition::new("unit_tests", validator(Capability::UnitTests))
            .with_dependencies(["syntax_check", "type_check", "syntax_check"])
            .critical()
            .parallel();

        assert_eq!(def.name, "unit_tests");
        assert_eq!(def.dependencies, vec!["syntax_check", "type_check"]);
        assert!(def.critical);
        assert!(def.parallel);
        assert_eq!(def.capability(), Capability::UnitTests);
    }

    #[test]
    fn test_effective_timeout() {
        let default = Duration::from_secs(300);
        let plain = StageDefinition::new("a", validator(Capability::Linting));
        assert_eq!(plain.effective_timeout(default), default);

        let doubled = plain.clone().with_timeout_multiplier(2.0);
        assert_eq!(doubled.effective_timeout(default), Duration::from_secs(600));

        let explicit = doubled.with_timeout(Duration::from_millis(50));
        assert_eq!(explicit.effective_timeout(default), Duration::from_millis(50));

        let bogus =
            StageDefinition::new("b", validator(Capability::Linting)).with_timeout_multiplier(-1.0);
        assert_eq!(bogus.effective_timeout(default), default);
    }

    #[test]
    fn test_manifest_bind() {
        let registry = ValidatorRegistry::new().with(validator(Capability::SecurityScan));
        let manifest: StageManifest = serde_json::from_value(serde_json::json!({
            "name": "security_scan",
            "capability": "security_scan",
            "critical": true,
            "timeout_seconds": 1.5,
            "dependencies": ["syntax_check"]
        }))
        .unwrap();

        let def = manifest.bind(&registry).unwrap();
        assert!(def.critical);
        assert!(!def.parallel);
        assert_eq!(def.timeout, Some(Duration::from_millis(1500)));
        assert_eq!(def.dependencies, vec!["syntax_check"]);
    }

    #[test]
    fn test_manifest_bind_missing_validator() {
        let manifest: StageManifest = serde_json::from_value(serde_json::json!({
            "name": "perf",
            "capability": "performance_analysis"
        }))
        .unwrap();

        let err = manifest.bind(&ValidatorRegistry::new()).unwrap_err();
        assert!(matches!(
            err,
            StagegateError::MissingValidator { capability: Capability::PerformanceAnalysis, .. }
        ));
    }

    #[test]
    fn test_manifest_bind_rejects_unrepresentable_timeout() {
        let registry = ValidatorRegistry::new().with(validator(Capability::UnitTests));
        for seconds in [1e20, -1.0, 0.0] {
            let manifest: StageManifest = serde_json::from_value(serde_json::json!({
                "name": "unit_tests",
                "capability": "unit_tests",
                "timeout_seconds": seconds
            }))
            .unwrap();

            let err = manifest.bind(&registry).unwrap_err();
            assert!(matches!(err, StagegateError::Config(_)), "{seconds}: {err}");
        }
    }

    #[test]
    fn test_huge_multiplier_falls_back_to_default() {
        let default = Duration::from_secs(300);
        let huge =
            StageDefinition::new("a", validator(Capability::Linting)).with_timeout_multiplier(1e30);
        assert_eq!(huge.effective_timeout(default), default);

        let nan = StageDefinition::new("b", validator(Capability::Linting))
            .with_timeout_multiplier(f64::NAN);
        assert_eq!(nan.effective_timeout(default), default);
    }
}

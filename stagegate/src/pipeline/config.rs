//! Pipeline run configuration.

use crate::errors::StagegateError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration recognised by a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Run parallel-tagged stages concurrently.
    #[serde(default = "default_true")]
    pub enable_parallel_execution: bool,
    /// Default per-stage deadline in seconds.
    #[serde(default = "default_stage_timeout")]
    pub stage_timeout_seconds: f64,
    /// Stop launching stages once too many have failed.
    #[serde(default = "default_true")]
    pub enable_early_termination: bool,
    /// Number of failed stages that triggers early termination.
    #[serde(default = "default_failure_threshold")]
    pub critical_failure_threshold: usize,
    /// Build error contexts for failed stages and stages with issues.
    #[serde(default = "default_true")]
    pub enable_error_context_generation: bool,
}

fn default_true() -> bool {
    true
}

fn default_stage_timeout() -> f64 {
    300.0
}

fn default_failure_threshold() -> usize {
    3
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enable_parallel_execution: default_true(),
            stage_timeout_seconds: default_stage_timeout(),
            enable_early_termination: default_true(),
            critical_failure_threshold: default_failure_threshold(),
            enable_error_context_generation: default_true(),
        }
    }
}

impl PipelineConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a configuration from JSON; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or the stage timeout is not
    /// a positive number.
    pub fn from_json(json: &str) -> Result<Self, StagegateError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the stage timeout is not positive or does not fit
    /// in a [`Duration`].
    pub fn validate(&self) -> Result<(), StagegateError> {
        match Duration::try_from_secs_f64(self.stage_timeout_seconds) {
            Ok(timeout) if !timeout.is_zero() => Ok(()),
            _ => Err(StagegateError::Config(format!(
                "stage_timeout_seconds must be a positive duration, got {}",
                self.stage_timeout_seconds
            ))),
        }
    }

    /// Enables or disables parallel execution.
    #[must_use]
    pub fn with_parallel_execution(mut self, enabled: bool) -> Self {
        self.enable_parallel_execution = enabled;
        self
    }

    /// Sets the default stage deadline.
    #[must_use]
    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout_seconds = timeout.as_secs_f64();
        self
    }

    /// Enables or disables early termination.
    #[must_use]
    pub fn with_early_termination(mut self, enabled: bool) -> Self {
        self.enable_early_termination = enabled;
        self
    }

    /// Sets the failure count that triggers early termination.
    #[must_use]
    pub fn with_failure_threshold(mut self, threshold: usize) -> Self {
        self.critical_failure_threshold = threshold;
        self
    }

    /// Enables or disables error context generation.
    #[must_use]
    pub fn with_error_context_generation(mut self, enabled: bool) -> Self {
        self.enable_error_context_generation = enabled;
        self
    }

    /// Gets the default stage deadline as a Duration.
    #[must_use]
    pub fn stage_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.stage_timeout_seconds)
            .ok()
            .filter(|t| !t.is_zero())
            .unwrap_or(Duration::from_secs(300))
    }

    /// Returns true if `failed` stages should stop further launches.
    ///
    /// A run with no failures never terminates, even with a zero threshold.
    #[must_use]
    pub fn should_terminate(&self, failed: usize) -> bool {
        self.enable_early_termination && failed > 0 && failed >= self.critical_failure_threshold
    }
}

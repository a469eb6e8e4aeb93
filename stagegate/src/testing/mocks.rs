//! Mock validators for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::core::StagePayload;
use crate::errors::ValidatorError;
use crate::stages::{Capability, ValidationContext, Validator};

/// A validator that always returns the same payload.
#[derive(Debug, Clone)]
pub struct StaticValidator {
    capability: Capability,
    payload: StagePayload,
}

impl StaticValidator {
    /// Creates a validator returning `payload`.
    #[must_use]
    pub fn new(capability: Capability, payload: StagePayload) -> Self {
        Self { capability, payload }
    }

    /// Creates a validator returning an empty payload.
    #[must_use]
    pub fn clean(capability: Capability) -> Self {
        Self::new(capability, StagePayload::new())
    }
}

#[async_trait]
impl Validator for StaticValidator {
    fn capability(&self) -> Capability {
        self.capability
    }

    async fn validate(&self, _ctx: &ValidationContext) -> Result<StagePayload, ValidatorError> {
        Ok(self.payload.clone())
    }
}

/// A validator that always fails.
#[derive(Debug, Clone)]
pub struct FailingValidator {
    capability: Capability,
    error: String,
}

impl FailingValidator {
    /// Creates a failing validator.
    #[must_use]
    pub fn new(capability: Capability, error: impl Into<String>) -> Self {
        Self {
            capability,
            error: error.into(),
        }
    }
}

#[async_trait]
impl Validator for FailingValidator {
    fn capability(&self) -> Capability {
        self.capability
    }

    async fn validate(&self, _ctx: &ValidationContext) -> Result<StagePayload, ValidatorError> {
        Err(ValidatorError::failed(self.error.clone()))
    }
}

/// A validator that sleeps before returning an empty payload.
#[derive(Debug, Clone)]
pub struct SlowValidator {
    capability: Capability,
    delay: Duration,
}

impl SlowValidator {
    /// Creates a slow validator.
    #[must_use]
    pub fn new(capability: Capability, delay: Duration) -> Self {
        Self { capability, delay }
    }
}

#[async_trait]
impl Validator for SlowValidator {
    fn capability(&self) -> Capability {
        self.capability
    }

    async fn validate(&self, _ctx: &ValidationContext) -> Result<StagePayload, ValidatorError> {
        tokio::time::sleep(self.delay).await;
        Ok(StagePayload::new())
    }
}

/// A validator that panics.
#[derive(Debug, Clone)]
pub struct PanickingValidator {
    capability: Capability,
    message: String,
}

impl PanickingValidator {
    /// Creates a panicking validator.
    #[must_use]
    pub fn new(capability: Capability, message: impl Into<String>) -> Self {
        Self {
            capability,
            message: message.into(),
        }
    }
}

#[async_trait]
impl Validator for PanickingValidator {
    fn capability(&self) -> Capability {
        self.capability
    }

    async fn validate(&self, _ctx: &ValidationContext) -> Result<StagePayload, ValidatorError> {
        panic!("{}", self.message);
    }
}

/// A validator that counts invocations and can record the order stages ran
/// in.
#[derive(Debug)]
pub struct CountingValidator {
    capability: Capability,
    calls: AtomicUsize,
    label: Option<String>,
    log: Option<Arc<Mutex<Vec<String>>>>,
    delay: Option<Duration>,
}

impl CountingValidator {
    /// Creates a counting validator.
    #[must_use]
    pub fn new(capability: Capability) -> Self {
        Self {
            capability,
            calls: AtomicUsize::new(0),
            label: None,
            log: None,
            delay: None,
        }
    }

    /// Creates a counting validator that appends `label` to `log` on every
    /// call.
    #[must_use]
    pub fn recording(
        capability: Capability,
        label: impl Into<String>,
        log: Arc<Mutex<Vec<String>>>,
    ) -> Self {
        Self {
            label: Some(label.into()),
            log: Some(log),
            ..Self::new(capability)
        }
    }

    /// Sleeps for `delay` on every call.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Returns the number of times the validator was called.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Validator for CountingValidator {
    fn capability(&self) -> Capability {
        self.capability
    }

    async fn validate(&self, ctx: &ValidationContext) -> Result<StagePayload, ValidatorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(log) = &self.log {
            let label = self.label.clone().unwrap_or_else(|| ctx.stage.clone());
            log.lock().push(label);
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(StagePayload::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ChangeDescriptor;
    use uuid::Uuid;

    fn ctx() -> ValidationContext {
        ValidationContext::new(
            Uuid::new_v4(),
            "unit_tests",
            serde_json::Value::Null,
            Arc::new(ChangeDescriptor::new("c1")),
        )
    }

    #[tokio::test]
    async fn test_counting_validator() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let validator = CountingValidator::recording(Capability::UnitTests, "first", log.clone());

        validator.validate(&ctx()).await.unwrap();
        validator.validate(&ctx()).await.unwrap();

        assert_eq!(validator.call_count(), 2);
        assert_eq!(*log.lock(), vec!["first", "first"]);
    }

    #[test]
    fn test_static_validator() {
        let validator = StaticValidator::new(
            Capability::Linting,
            StagePayload::new().with_recommendation("split long functions"),
        );
        let payload = tokio_test::block_on(validator.validate(&ctx())).unwrap();
        assert_eq!(payload.recommendations, vec!["split long functions"]);
    }

    #[tokio::test]
    async fn test_failing_validator() {
        let validator = FailingValidator::new(Capability::UnitTests, "3 tests failed");
        let err = validator.validate(&ctx()).await.unwrap_err();
        assert_eq!(err.to_string(), "3 tests failed");
    }
}

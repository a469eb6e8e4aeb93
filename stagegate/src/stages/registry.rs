//! Registry mapping capabilities to validator instances.

use super::{Capability, Validator};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of validators, one per capability.
///
/// Used to bind stage manifests loaded from configuration to the
/// validators that implement them.
#[derive(Debug, Default, Clone)]
pub struct ValidatorRegistry {
    validators: HashMap<Capability, Arc<dyn Validator>>,
}

impl ValidatorRegistry {
    /// Creates a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a validator under its own capability, replacing any
    /// previous registration.
    pub fn register(&mut self, validator: Arc<dyn Validator>) {
        self.validators.insert(validator.capability(), validator);
    }

    /// Registers a validator, builder style.
    #[must_use]
    pub fn with(mut self, validator: Arc<dyn Validator>) -> Self {
        self.register(validator);
        self
    }

    /// Gets the validator for a capability.
    #[must_use]
    pub fn get(&self, capability: Capability) -> Option<Arc<dyn Validator>> {
        self.validators.get(&capability).cloned()
    }

    /// Returns true if a validator is registered for the capability.
    #[must_use]
    pub fn contains(&self, capability: Capability) -> bool {
        self.validators.contains_key(&capability)
    }

    /// Returns the number of registered validators.
    #[must_use]
    pub fn len(&self) -> usize {
        self.validators.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StagePayload;
    use crate::stages::FnValidator;

    #[test]
    fn test_register_and_get() {
        let registry = ValidatorRegistry::new()
            .with(Arc::new(FnValidator::new(Capability::Linting, |_| Ok(StagePayload::new()))));

        assert_eq!(registry.len(), 1);
        assert!(registry.contains(Capability::Linting));
        assert!(registry.get(Capability::Linting).is_some());
        assert!(registry.get(Capability::UnitTests).is_none());
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = ValidatorRegistry::new();
        let linter = FnValidator::new(Capability::Linting, |_| Ok(StagePayload::new()));
        registry.register(Arc::new(linter));
        registry.register(Arc::new(FnValidator::new(Capability::Linting, |_| {
            Ok(StagePayload::new().with_recommendation("second"))
        })));

        assert_eq!(registry.len(), 1);
    }
}

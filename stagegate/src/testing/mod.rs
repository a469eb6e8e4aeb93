//! Testing utilities for validation pipelines.
//!
//! This module provides:
//! - Mock validators
//! - Standard stage manifests and change fixtures
//! - A pipeline harness that collects events

mod fixtures;
mod mocks;

pub use fixtures::{
    clean_registry, sample_change, standard_manifests, standard_stages, TestPipeline,
};
pub use mocks::{
    CountingValidator, FailingValidator, PanickingValidator, SlowValidator, StaticValidator,
};

//! Core domain model types for stagegate.
//!
//! This module contains the fundamental types used throughout the engine:
//! - Stage, overall status, grade and severity enums
//! - Validator payload types
//! - The change descriptor

mod change;
mod payload;
mod status;

pub use change::ChangeDescriptor;
pub use payload::{Issue, QualityGate, ResourceMetrics, SecurityFinding, StagePayload};
pub use status::{Grade, OverallStatus, Severity, StageStatus};

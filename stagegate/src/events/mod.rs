//! Pipeline lifecycle events.
//!
//! The scheduler reports what it does through an [`EventSink`]. Event types
//! are plain dotted strings; the payload always carries `run_id` and, for
//! stage events, `stage`.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// A run started.
pub const PIPELINE_STARTED: &str = "pipeline.started";
/// A run finished, successfully or not.
pub const PIPELINE_COMPLETED: &str = "pipeline.completed";
/// A run stopped launching stages.
pub const PIPELINE_ABORTED: &str = "pipeline.aborted";
/// A stage's validator was invoked.
pub const STAGE_STARTED: &str = "stage.started";
/// A stage completed.
pub const STAGE_COMPLETED: &str = "stage.completed";
/// A stage failed or timed out.
pub const STAGE_FAILED: &str = "stage.failed";
/// A stage was skipped because a dependency failed.
pub const STAGE_SKIPPED: &str = "stage.skipped";

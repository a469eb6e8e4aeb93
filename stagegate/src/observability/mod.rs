//! Tracing setup and span helpers.

mod tracing;

pub use self::tracing::{init_tracing, stage_span, SpanTimer};

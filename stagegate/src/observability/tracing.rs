//! Tracing subscriber initialisation and stage spans.
//!
//! The engine itself only emits through `tracing` macros; installing a
//! subscriber is left to the embedding binary. [`init_tracing`] is a
//! convenience for binaries and tests that do not have their own.

use std::time::Instant;
use tracing::{Level, Span};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};
use uuid::Uuid;

/// Initialise the global tracing subscriber.
///
/// * `json` - emit newline-delimited JSON instead of human readable lines.
/// * `level` - default verbosity when `RUST_LOG` is not set.
///
/// Only the first call in a process takes effect.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false))
            .try_init()
            .ok();
    }
}

/// Creates the span a stage executes in.
#[must_use]
pub fn stage_span(run_id: Uuid, stage: &str, critical: bool) -> Span {
    tracing::info_span!("stage", %run_id, stage, critical)
}

/// Measures wall-clock time of a stage or run.
#[derive(Debug, Clone)]
pub struct SpanTimer {
    start: Instant,
    name: String,
}

impl SpanTimer {
    /// Starts a new timer.
    #[must_use]
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Returns the elapsed time in whole milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.start.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Returns the timer name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_timer() {
        let timer = SpanTimer::start("unit_tests");
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(timer.elapsed_ms() >= 10);
        assert_eq!(timer.name(), "unit_tests");
    }

    #[test]
    fn test_init_tracing_twice() {
        init_tracing(false, Level::DEBUG);
        init_tracing(true, Level::INFO);
        let span = stage_span(Uuid::new_v4(), "linting", false);
        let _entered = span.enter();
    }
}

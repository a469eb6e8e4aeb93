//! Error contexts and remediation hints.
//!
//! Every stage that failed or reported issues gets an [`ErrorContext`]: a
//! self-contained bundle of what went wrong, where, how urgent it is and
//! what to try next. Runs that could not complete get one more,
//! pipeline-level context.

mod context;
mod remediation;

pub use context::{Classification, ErrorContext, ErrorContextBuilder, FixPriority};
pub use remediation::remediation_for;

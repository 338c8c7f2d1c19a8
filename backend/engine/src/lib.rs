//! The call orchestration engine.
//!
//! `CallRouter` is the entry point: it validates requests, collapses
//! duplicates, and hands accepted calls to `CallOrchestrator`, which
//! drives the session-establishment state machine against whichever
//! provider adapter the request selected. `CallRegistry` owns all
//! in-flight call state; `RetryPolicy` bounds transient-failure
//! retries.

pub mod orchestrator;
pub mod registry;
pub mod retry;
pub mod router;

pub use orchestrator::CallOrchestrator;
pub use registry::{CallRegistry, CreateOutcome};
pub use retry::{RetryDecision, RetryPolicy};
pub use router::CallRouter;

#[cfg(test)]
pub(crate) mod testutil;

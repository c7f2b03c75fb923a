//! Durable saga workflow orchestration engine.
//!
//! Drives a fixed, ordered activity sequence through irreversible
//! external side effects while guaranteeing that partial failure never
//! leaves the system in an inconsistent state. A run survives process
//! restarts between steps, suspends for external signals without
//! busy-waiting, retries transient failures with bounded backoff, and
//! unwinds already-applied side effects in reverse order when a step
//! fails permanently.
//!
//! The engine has no internal scheduler: it executes synchronously
//! within a single invocation until it reaches completion, suspension,
//! retry-wait, or terminal failure. Driving retries forward in time is
//! the job of an external trigger that calls [`WorkflowEngine::retry_now`].

pub mod activity;
pub mod definition;
pub mod engine;
pub mod error;
pub mod retry;

pub use activity::{Activity, ActivityError, ActivityRegistry, ActivityRegistryBuilder};
pub use definition::{ActivityStep, WorkflowDefinition};
pub use engine::{RunView, WorkflowEngine};
pub use error::EngineError;
pub use retry::retry_delay;

//! C11: the worker process — long-poll reserve, execute, heartbeat,
//! report, with error-class backoff and graceful drain.

pub mod backoff;
pub mod client;
pub mod loop_;
pub mod script_runner;

pub use backoff::WorkerBackoff;
pub use client::JobApiClient;
pub use loop_::{ErrorClass, WorkerLoop};
pub use script_runner::{ScriptOutcome, ScriptRunner};

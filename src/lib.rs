//! Site-monitoring job orchestrator: a durable job queue, a worker loop
//! that executes browser-automation and rule-evaluation jobs, multi-tier
//! caches backing the rule evaluators, and telemetry batching/ingest.

pub mod common;
pub mod config;
pub mod kernel;
pub mod server;
pub mod worker;

pub use config::{ServerConfig, WorkerConfig};

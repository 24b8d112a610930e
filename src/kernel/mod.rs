//! The core domain: durable job queue, multi-tier caches, rule
//! evaluators, durable store adapters, and telemetry batching/ingest.

pub mod cache;
pub mod jobs;
pub mod rules;
pub mod store;
pub mod telemetry;

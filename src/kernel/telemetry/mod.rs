//! C12/C13: telemetry batching, shipping, bulk ingest and correlation.

pub mod batch;
pub mod batcher;
pub mod ingest;

pub use batch::{BatchMetadata, ChecksumInfo, EventBatch, SequenceInfo, TelemetryEventPayload};
pub use batcher::TelemetryBatcher;
pub use ingest::{BulkEventRequest, IncomingEvent, TelemetryIngestor};

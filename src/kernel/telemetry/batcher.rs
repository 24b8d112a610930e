//! C12: the telemetry batcher/shipper. Accumulates events in a buffer and
//! flushes on size, age, or execution-end triggers, shipping each batch
//! over HTTP with at most one in-flight ship and order-preserving retry.
//!
//! New code — the teacher streams events over an in-process event bus, not
//! batched HTTP; this keeps its `tracing`-on-failure and `reqwest::Client`
//! conventions but the batching/ordering logic is built directly from
//! spec §4.12.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use crate::common::AppError;
use crate::kernel::telemetry::batch::{EventBatch, TelemetryEventPayload};

const DEFAULT_SHIP_TIMEOUT: Duration = Duration::from_secs(10);

struct Buffer {
    events: VecDeque<TelemetryEventPayload>,
    last_flush: Instant,
}

/// Accumulates events for one telemetry session and ships them as batches.
pub struct TelemetryBatcher {
    session_id: Uuid,
    job_id: Option<Uuid>,
    endpoint: String,
    client: reqwest::Client,
    batch_size: usize,
    max_batch_age: Duration,
    buffer: Mutex<Buffer>,
    /// A batch that failed to ship, held verbatim (same `batch_id` and
    /// `sequence_number`) so the next flush retries it before shipping
    /// anything newer.
    pending_retry: Mutex<Option<EventBatch>>,
    ship_lock: Mutex<()>,
    sequence: AtomicU64,
}

impl TelemetryBatcher {
    pub fn new(
        session_id: Uuid,
        job_id: Option<Uuid>,
        endpoint: impl Into<String>,
        batch_size: usize,
        max_batch_age: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(DEFAULT_SHIP_TIMEOUT).build()?;
        Ok(Self {
            session_id,
            job_id,
            endpoint: endpoint.into(),
            client,
            batch_size: batch_size.max(1),
            max_batch_age,
            buffer: Mutex::new(Buffer {
                events: VecDeque::new(),
                last_flush: Instant::now(),
            }),
            pending_retry: Mutex::new(None),
            ship_lock: Mutex::new(()),
            sequence: AtomicU64::new(0),
        })
    }

    /// Record an event, flushing immediately if the buffer has reached
    /// `batch_size`.
    pub async fn push(&self, event: TelemetryEventPayload) -> Result<(), AppError> {
        let should_flush = {
            let mut buffer = self.buffer.lock().await;
            buffer.events.push_back(event);
            buffer.events.len() >= self.batch_size
        };
        if should_flush {
            self.flush(false).await?;
        }
        Ok(())
    }

    /// Flush if `max_batch_age` has elapsed since the last flush. Intended
    /// to be called from a periodic ticker alongside `push`.
    pub async fn flush_if_aged(&self) -> Result<(), AppError> {
        let aged = {
            let buffer = self.buffer.lock().await;
            !buffer.events.is_empty() && buffer.last_flush.elapsed() >= self.max_batch_age
        };
        if aged {
            self.flush(false).await?;
        }
        Ok(())
    }

    /// Final flush at execution end: drains the buffer regardless of size
    /// or age, and waits for any concurrently in-flight ship to finish
    /// first so batches ship in order.
    pub async fn drain(&self) -> Result<(), AppError> {
        self.flush(true).await
    }

    /// The events not yet durably shipped: a held-back failed batch (if
    /// any), in order, followed by whatever's still buffered.
    pub async fn pending_events(&self) -> Vec<TelemetryEventPayload> {
        let retry = self.pending_retry.lock().await;
        let buffer = self.buffer.lock().await;
        retry
            .iter()
            .flat_map(|batch| batch.events.iter().cloned())
            .chain(buffer.events.iter().cloned())
            .collect()
    }

    async fn flush(&self, is_final: bool) -> Result<(), AppError> {
        let _ship_guard = self.ship_lock.lock().await;

        // Retry a previously failed batch first, verbatim, so order and
        // identity (batch_id, sequence_number) are preserved across the retry.
        {
            let mut retry_slot = self.pending_retry.lock().await;
            if let Some(mut batch) = retry_slot.take() {
                batch.batch_metadata.retry_count += 1;
                if let Err(err) = self.ship(&batch).await {
                    tracing::warn!(
                        batch_id = %batch.batch_id,
                        session_id = %self.session_id,
                        error = %err,
                        "retry of previously failed batch failed again"
                    );
                    *retry_slot = Some(batch);
                    return Err(err);
                }
            }
        }

        let drained: Vec<TelemetryEventPayload> = {
            let mut buffer = self.buffer.lock().await;
            buffer.last_flush = Instant::now();
            buffer.events.drain(..).collect()
        };

        if drained.is_empty() {
            return Ok(());
        }

        let chunks: Vec<Vec<TelemetryEventPayload>> = drained
            .chunks(self.batch_size)
            .map(|c| c.to_vec())
            .collect();
        let chunk_count = chunks.len();

        for (idx, chunk) in chunks.into_iter().enumerate() {
            let sequence_number = self.sequence.fetch_add(1, Ordering::SeqCst);
            let is_first_batch = sequence_number == 0;
            let is_last_batch = is_final && idx + 1 == chunk_count;

            let batch = EventBatch::new(
                self.session_id,
                chunk,
                sequence_number,
                is_first_batch,
                is_last_batch,
                self.job_id,
            )
            .map_err(AppError::Serialization)?;

            if let Err(err) = self.ship(&batch).await {
                tracing::warn!(
                    batch_id = %batch.batch_id,
                    session_id = %self.session_id,
                    error = %err,
                    "batch ship failed, holding for retry"
                );
                *self.pending_retry.lock().await = Some(batch);
                return Err(err);
            }
        }

        Ok(())
    }

    async fn ship(&self, batch: &EventBatch) -> Result<(), AppError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("X-Batch-Id", batch.batch_id.to_string())
            .header("X-Session-Id", batch.session_id.to_string())
            .json(batch)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::Network(anyhow::anyhow!(
                "telemetry endpoint returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(n: i64) -> TelemetryEventPayload {
        TelemetryEventPayload {
            event_type: "requestWillBeSent".into(),
            timestamp: n,
            data: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn push_below_batch_size_does_not_flush() {
        let batcher = TelemetryBatcher::new(Uuid::nil(), None, "http://127.0.0.1:1/ingest", 10, Duration::from_secs(60))
            .unwrap();
        batcher.push(event(1)).await.unwrap();
        let buffer = batcher.buffer.lock().await;
        assert_eq!(buffer.events.len(), 1);
    }

    #[tokio::test]
    async fn drain_on_empty_buffer_is_a_no_op() {
        let batcher = TelemetryBatcher::new(Uuid::nil(), None, "http://127.0.0.1:1/ingest", 10, Duration::from_secs(60))
            .unwrap();
        batcher.drain().await.unwrap();
    }

    #[tokio::test]
    async fn failed_ship_holds_the_batch_for_retry() {
        let batcher = TelemetryBatcher::new(Uuid::nil(), None, "http://127.0.0.1:1/unreachable", 1, Duration::from_secs(60))
            .unwrap();
        batcher.push(event(1)).await.unwrap_err();
        let pending = batcher.pending_events().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].timestamp, 1);
    }
}

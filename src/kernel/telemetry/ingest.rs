//! C13: bulk telemetry ingest + correlator.

use std::sync::Arc;

use uuid::Uuid;

use crate::common::AppError;
use crate::kernel::jobs::model::{CreateJobRequest, JobKind};
use crate::kernel::jobs::queue::JobQueue;
use crate::kernel::store::events::{PgTelemetryStore, TelemetryEvent};

const MAX_EVENTS_PER_BATCH: usize = 10_000;

/// One event as received over the bulk ingest endpoint, prior to
/// persistence.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct IncomingEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub timestamp: i64,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct BulkEventRequest {
    pub session_id: Uuid,
    #[serde(default)]
    pub source_job_id: Option<Uuid>,
    pub events: Vec<IncomingEvent>,
}

impl BulkEventRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.session_id.is_nil() {
            return Err(AppError::InvalidInput("session_id must not be empty".into()));
        }
        if self.events.is_empty() {
            return Err(AppError::InvalidInput("events must not be empty".into()));
        }
        if self.events.len() > MAX_EVENTS_PER_BATCH {
            return Err(AppError::InvalidInput(format!(
                "events exceeds max batch size of {MAX_EVENTS_PER_BATCH}"
            )));
        }
        for event in &self.events {
            if event.event_type.trim().is_empty() {
                return Err(AppError::InvalidInput("event type must not be empty".into()));
            }
            if event.timestamp == 0 {
                return Err(AppError::InvalidInput("event timestamp must be non-zero".into()));
            }
        }
        Ok(())
    }
}

pub struct TelemetryIngestor {
    store: Arc<PgTelemetryStore>,
    job_queue: Option<Arc<dyn JobQueue>>,
}

impl TelemetryIngestor {
    pub fn new(store: Arc<PgTelemetryStore>, job_queue: Option<Arc<dyn JobQueue>>) -> Self {
        Self { store, job_queue }
    }

    /// Persists a validated batch, correlates `responseReceived` events
    /// carrying a `captured_file` context to their originating
    /// `requestWillBeSent` event, and optionally enqueues a follow-on rule
    /// evaluation job referencing the new event ids.
    pub async fn ingest(&self, request: BulkEventRequest) -> Result<Vec<Uuid>, AppError> {
        request.validate()?;

        let mut event_ids = Vec::with_capacity(request.events.len());

        for incoming in &request.events {
            let event = TelemetryEvent::builder()
                .session_id(request.session_id)
                .source_job_id(request.source_job_id)
                .event_type(incoming.event_type.clone())
                .event_data(incoming.data.clone())
                .build();

            let stored = self.store.insert_event(&event).await?;
            event_ids.push(stored.id);

            if stored.event_type == "responseReceived" {
                if let Some(request_id) = stored
                    .event_data
                    .get("captured_file")
                    .and(stored.event_data.get("request_id"))
                    .and_then(|v| v.as_str())
                {
                    self.correlate(request.session_id, request_id, stored.id).await?;
                }
            }
        }

        if let Some(queue) = &self.job_queue {
            queue
                .create(CreateJobRequest {
                    job_type: JobKind::Rules,
                    payload: serde_json::json!({
                        "event_ids": event_ids,
                        "session_id": request.session_id,
                    }),
                    metadata: serde_json::json!({}),
                    priority: 50,
                    site_id: None,
                    source_id: None,
                    session_id: Some(request.session_id),
                    is_test: false,
                    scheduled_at: None,
                    max_retries: 3,
                })
                .await?;
        }

        Ok(event_ids)
    }

    async fn correlate(&self, session_id: Uuid, request_id: &str, response_event_id: Uuid) -> Result<(), AppError> {
        let Some(origin) = self
            .store
            .find_by_request_id(session_id, "requestWillBeSent", request_id)
            .await?
        else {
            tracing::debug!(request_id, %response_event_id, "no requestWillBeSent match to correlate against");
            return Ok(());
        };

        tracing::debug!(
            request_id,
            origin_event_id = %origin.id,
            %response_event_id,
            "correlated captured file to originating request"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(events: Vec<IncomingEvent>) -> BulkEventRequest {
        BulkEventRequest {
            session_id: Uuid::from_u128(1),
            source_job_id: None,
            events,
        }
    }

    fn event(event_type: &str, timestamp: i64) -> IncomingEvent {
        IncomingEvent {
            event_type: event_type.into(),
            timestamp,
            data: serde_json::json!({}),
        }
    }

    #[test]
    fn rejects_nil_session_id() {
        let mut req = request(vec![event("requestWillBeSent", 1)]);
        req.session_id = Uuid::nil();
        assert!(req.validate().is_err());
    }

    #[test]
    fn rejects_empty_event_list() {
        assert!(request(vec![]).validate().is_err());
    }

    #[test]
    fn rejects_zero_timestamp() {
        assert!(request(vec![event("requestWillBeSent", 0)]).validate().is_err());
    }

    #[test]
    fn rejects_empty_event_type() {
        assert!(request(vec![event("  ", 1)]).validate().is_err());
    }

    #[test]
    fn accepts_a_well_formed_batch() {
        assert!(request(vec![event("requestWillBeSent", 1)]).validate().is_ok());
    }
}

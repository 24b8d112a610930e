//! The batch envelope shape shipped by C12 and received by C13 (spec §3's
//! `EventBatch`).

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::common::new_id;

/// A single captured telemetry event, prior to persistence.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TelemetryEventPayload {
    #[serde(rename = "type")]
    pub event_type: String,
    pub timestamp: i64,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ChecksumInfo {
    pub algorithm: String,
    pub value: String,
}

impl ChecksumInfo {
    /// sha256 over the JSON-encoded event list, matching §4.12's checksum
    /// definition.
    pub fn sha256_over(events: &[TelemetryEventPayload]) -> anyhow::Result<Self> {
        let encoded = serde_json::to_vec(events)?;
        let mut hasher = Sha256::new();
        hasher.update(&encoded);
        Ok(Self {
            algorithm: "sha256".to_string(),
            value: hex::encode(hasher.finalize()),
        })
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BatchMetadata {
    pub created_at: DateTime<Utc>,
    pub event_count: usize,
    pub total_size: usize,
    pub checksum: ChecksumInfo,
    pub retry_count: u32,
    pub job_id: Option<Uuid>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SequenceInfo {
    pub sequence_number: u64,
    pub is_first_batch: bool,
    pub is_last_batch: bool,
}

/// A single shipped unit: up to `batch_size` events plus the bookkeeping
/// the shipper and the ingest side both need.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EventBatch {
    pub batch_id: Uuid,
    pub session_id: Uuid,
    pub events: Vec<TelemetryEventPayload>,
    pub batch_metadata: BatchMetadata,
    pub sequence_info: SequenceInfo,
}

impl EventBatch {
    pub fn new(
        session_id: Uuid,
        events: Vec<TelemetryEventPayload>,
        sequence_number: u64,
        is_first_batch: bool,
        is_last_batch: bool,
        job_id: Option<Uuid>,
    ) -> anyhow::Result<Self> {
        let checksum = ChecksumInfo::sha256_over(&events)?;
        let total_size = serde_json::to_vec(&events)?.len();

        Ok(Self {
            batch_id: new_id(),
            session_id,
            batch_metadata: BatchMetadata {
                created_at: Utc::now(),
                event_count: events.len(),
                total_size,
                checksum,
                retry_count: 0,
                job_id,
            },
            sequence_info: SequenceInfo {
                sequence_number,
                is_first_batch,
                is_last_batch,
            },
            events,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(n: i64) -> TelemetryEventPayload {
        TelemetryEventPayload {
            event_type: "requestWillBeSent".into(),
            timestamp: n,
            data: serde_json::json!({"n": n}),
        }
    }

    #[test]
    fn checksum_is_stable_for_identical_event_lists() {
        let events = vec![event(1), event(2)];
        let a = ChecksumInfo::sha256_over(&events).unwrap();
        let b = ChecksumInfo::sha256_over(&events).unwrap();
        assert_eq!(a.value, b.value);
    }

    #[test]
    fn checksum_differs_when_events_differ() {
        let a = ChecksumInfo::sha256_over(&[event(1)]).unwrap();
        let b = ChecksumInfo::sha256_over(&[event(2)]).unwrap();
        assert_ne!(a.value, b.value);
    }

    #[test]
    fn new_batch_carries_event_count_and_sequence_flags() {
        let batch = EventBatch::new(Uuid::nil(), vec![event(1), event(2)], 0, true, false, None).unwrap();
        assert_eq!(batch.batch_metadata.event_count, 2);
        assert!(batch.sequence_info.is_first_batch);
        assert!(!batch.sequence_info.is_last_batch);
    }
}

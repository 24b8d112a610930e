//! The telemetry event entity (spec §3, C13) and its durable repository.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::common::{new_id, AppError};

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize, serde::Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct TelemetryEvent {
    #[builder(default = new_id())]
    pub id: Uuid,
    pub session_id: Uuid,
    #[builder(default, setter(strip_option))]
    pub source_job_id: Option<Uuid>,
    pub event_type: String,
    pub event_data: serde_json::Value,
    #[builder(default = serde_json::json!({}))]
    pub metadata: serde_json::Value,
    #[builder(default, setter(strip_option))]
    pub storage_key: Option<String>,
    #[builder(default = 0)]
    pub priority: i32,
    #[builder(default = true)]
    pub should_process: bool,
    #[builder(default = false)]
    pub processed: bool,
    #[builder(default = Utc::now())]
    pub received_at: DateTime<Utc>,
}

impl TelemetryEvent {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.event_type.trim().is_empty() {
            return Err(AppError::InvalidInput("event_type must not be empty".into()));
        }
        Ok(())
    }
}

/// Persisted form of a batch envelope (spec §3's `EventBatch`), recording
/// the checksum and sequence metadata a shipped batch arrived with.
#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct EventBatchRecord {
    pub batch_id: Uuid,
    pub session_id: Uuid,
    pub event_count: i32,
    pub total_size: i64,
    pub checksum_algorithm: String,
    pub checksum_value: String,
    pub retry_count: i32,
    pub source_job_id: Option<Uuid>,
    pub sequence_number: i32,
    pub is_first_batch: bool,
    pub is_last_batch: bool,
    pub received_at: DateTime<Utc>,
}

pub struct PgTelemetryStore {
    pool: PgPool,
}

impl PgTelemetryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert_event(&self, event: &TelemetryEvent) -> Result<TelemetryEvent, AppError> {
        event.validate()?;
        let row = sqlx::query_as::<_, TelemetryEvent>(
            r#"
            INSERT INTO telemetry_events (
                id, session_id, source_job_id, event_type, event_data, metadata,
                storage_key, priority, should_process, processed, received_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(event.id)
        .bind(event.session_id)
        .bind(event.source_job_id)
        .bind(&event.event_type)
        .bind(&event.event_data)
        .bind(&event.metadata)
        .bind(&event.storage_key)
        .bind(event.priority)
        .bind(event.should_process)
        .bind(event.processed)
        .bind(event.received_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn mark_processed(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("UPDATE telemetry_events SET processed = true WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Finds the `requestWillBeSent` sibling event for a `responseReceived`
    /// or `captured_file` event sharing the same `request_id` in its
    /// `event_data`, used to correlate request/response pairs (spec §4.13).
    pub async fn find_by_request_id(
        &self,
        session_id: Uuid,
        event_type: &str,
        request_id: &str,
    ) -> Result<Option<TelemetryEvent>, AppError> {
        let row = sqlx::query_as::<_, TelemetryEvent>(
            r#"
            SELECT * FROM telemetry_events
            WHERE session_id = $1 AND event_type = $2 AND event_data->>'request_id' = $3
            ORDER BY received_at DESC
            LIMIT 1
            "#,
        )
        .bind(session_id)
        .bind(event_type)
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn record_batch(&self, batch: &EventBatchRecord) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO event_batches (
                batch_id, session_id, event_count, total_size, checksum_algorithm,
                checksum_value, retry_count, source_job_id, sequence_number,
                is_first_batch, is_last_batch, received_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (batch_id) DO UPDATE SET retry_count = EXCLUDED.retry_count
            "#,
        )
        .bind(batch.batch_id)
        .bind(batch.session_id)
        .bind(batch.event_count)
        .bind(batch.total_size)
        .bind(&batch.checksum_algorithm)
        .bind(&batch.checksum_value)
        .bind(batch.retry_count)
        .bind(batch.source_job_id)
        .bind(batch.sequence_number)
        .bind(batch.is_first_batch)
        .bind(batch.is_last_batch)
        .bind(batch.received_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

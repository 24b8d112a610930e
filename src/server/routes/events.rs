//! C13 bulk telemetry ingest endpoint.

use axum::extract::State;
use axum::Json;
use uuid::Uuid;

use crate::kernel::telemetry::BulkEventRequest;
use crate::server::error::ApiError;
use crate::server::state::AppState;

pub async fn ingest_events_handler(
    State(state): State<AppState>,
    Json(req): Json<BulkEventRequest>,
) -> Result<Json<Vec<Uuid>>, ApiError> {
    let ids = state.ingestor.ingest(req).await?;
    Ok(Json(ids))
}

//! Axum router assembly.

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::server::routes::{
    complete_job_handler, create_job_handler, fail_job_handler, get_job_handler,
    heartbeat_handler, ingest_events_handler, list_jobs_handler, reserve_job_handler,
    stats_handler,
};
use crate::server::routes::health_handler;
use crate::server::state::AppState;

/// Builds the job API + telemetry ingest router.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/jobs", post(create_job_handler).get(list_jobs_handler))
        .route("/jobs/reserve", post(reserve_job_handler))
        .route("/jobs/stats", get(stats_handler))
        .route("/jobs/:id", get(get_job_handler))
        .route("/jobs/:id/heartbeat", post(heartbeat_handler))
        .route("/jobs/:id/complete", post(complete_job_handler))
        .route("/jobs/:id/fail", post(fail_job_handler))
        .route("/events", post(ingest_events_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

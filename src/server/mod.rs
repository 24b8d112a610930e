//! HTTP control plane (C9/C13 surface): the job API workers long-poll
//! against, and the bulk telemetry ingest endpoint.

pub mod app;
pub mod error;
pub mod routes;
pub mod state;

pub use app::build_app;
pub use error::ApiError;
pub use state::AppState;

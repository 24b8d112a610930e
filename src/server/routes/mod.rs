pub mod events;
pub mod health;
pub mod jobs;

pub use events::ingest_events_handler;
pub use health::health_handler;
pub use jobs::{
    complete_job_handler, create_job_handler, fail_job_handler, get_job_handler, heartbeat_handler,
    list_jobs_handler, reserve_job_handler, stats_handler,
};

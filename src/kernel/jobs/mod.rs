//! The job dispatch core (C9): model, queue, notifier, lease reaper,
//! scheduled-task reconciler, and failure fan-out.

pub mod failure_notifier;
pub mod model;
pub mod notifier;
pub mod queue;
pub mod reaper;
pub mod scheduler;

pub use failure_notifier::{FailureNotifier, FailureSink, LoggingFailureSink};
pub use model::{
    AlertPayload, BrowserPayload, CreateJobRequest, Job, JobKind, JobPayload, JobStatus,
    RulesPayload, SecretRefreshPayload,
};
pub use notifier::Notifier;
pub use queue::{JobQueue, JobStats, ListJobsFilter, PostgresJobQueue};
pub use reaper::LeaseReaper;
pub use scheduler::{NewScheduledTask, ScheduledTask, ScheduledTaskReconciler};

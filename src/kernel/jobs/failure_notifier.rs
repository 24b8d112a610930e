//! Failure notifier (C14): fan out a terminal job failure to every
//! registered sink (e.g. an alert webhook, a metrics counter).
//!
//! Grounded on the `JobEvent::DeadLettered` variant in `jobs/events.rs`,
//! reshaped from "one more serializable event on a bus" into a small
//! sink-fanout service, since this crate has no NATS-backed event bus.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::kernel::jobs::model::JobKind;

/// A terminal (non-retryable) job failure.
#[derive(Debug, Clone)]
pub struct FailureEvent {
    pub job_id: Uuid,
    pub job_type: JobKind,
    pub site_id: Option<Uuid>,
    pub error: String,
}

/// A destination for dead-letter notifications. Implementations should be
/// best-effort: a sink failing must never fail the job transition itself.
#[async_trait]
pub trait FailureSink: Send + Sync {
    async fn handle(&self, event: &FailureEvent) -> anyhow::Result<()>;

    fn name(&self) -> &str;
}

/// Fans a dead-letter event out to every registered [`FailureSink`]
/// concurrently, logging (but swallowing) sink errors.
#[derive(Default)]
pub struct FailureNotifier {
    sinks: Vec<Arc<dyn FailureSink>>,
}

impl FailureNotifier {
    pub fn new(sinks: Vec<Arc<dyn FailureSink>>) -> Self {
        Self { sinks }
    }

    pub async fn notify(&self, job_id: Uuid, job_type: JobKind, site_id: Option<Uuid>, error: &str) {
        if self.sinks.is_empty() {
            return;
        }

        let event = FailureEvent {
            job_id,
            job_type,
            site_id,
            error: error.to_string(),
        };

        let futures = self.sinks.iter().map(|sink| {
            let sink = sink.clone();
            let event = event.clone();
            async move {
                if let Err(err) = sink.handle(&event).await {
                    tracing::warn!(
                        sink = sink.name(),
                        %job_id,
                        error = %err,
                        "failure sink rejected dead-letter notification"
                    );
                }
            }
        });

        futures::future::join_all(futures).await;
    }
}

/// An in-memory sink, useful for tests and for a process-local alert log.
pub struct LoggingFailureSink;

#[async_trait]
impl FailureSink for LoggingFailureSink {
    async fn handle(&self, event: &FailureEvent) -> anyhow::Result<()> {
        tracing::error!(
            job_id = %event.job_id,
            job_type = event.job_type.as_str(),
            site_id = ?event.site_id,
            error = %event.error,
            "job dead-lettered"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "logging"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink(Arc<AtomicUsize>);

    #[async_trait]
    impl FailureSink for CountingSink {
        async fn handle(&self, _event: &FailureEvent) -> anyhow::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    struct FailingSink;

    #[async_trait]
    impl FailureSink for FailingSink {
        async fn handle(&self, _event: &FailureEvent) -> anyhow::Result<()> {
            anyhow::bail!("sink unavailable")
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    #[tokio::test]
    async fn notify_fans_out_to_all_sinks() {
        let count = Arc::new(AtomicUsize::new(0));
        let notifier = FailureNotifier::new(vec![
            Arc::new(CountingSink(count.clone())),
            Arc::new(CountingSink(count.clone())),
        ]);

        notifier
            .notify(Uuid::nil(), JobKind::Browser, None, "boom")
            .await;

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn a_failing_sink_does_not_block_the_others() {
        let count = Arc::new(AtomicUsize::new(0));
        let notifier = FailureNotifier::new(vec![
            Arc::new(FailingSink),
            Arc::new(CountingSink(count.clone())),
        ]);

        notifier
            .notify(Uuid::nil(), JobKind::Rules, None, "boom")
            .await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn notify_is_a_no_op_with_no_sinks() {
        let notifier = FailureNotifier::default();
        notifier
            .notify(Uuid::nil(), JobKind::Alert, None, "boom")
            .await;
    }
}

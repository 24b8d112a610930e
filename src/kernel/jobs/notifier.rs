//! Long-poll wake primitive for `ReserveNext`.
//!
//! The teacher's worker (`jobs/worker.rs`'s `Service::run`) polls on a fixed
//! `max_poll_interval` with no wake signal. The spec calls for `ReserveNext`
//! to block up to a wait window and return early when matching work arrives
//! (§4.9 `Subscribe`), so this is new code: one [`tokio::sync::Notify`] per
//! job kind, fanned out on `Create` and on failure-retry rescheduling.

use std::time::Duration;

use tokio::sync::Notify;

use crate::kernel::jobs::model::JobKind;

/// One independently-wakeable channel per job kind.
pub struct Notifier {
    browser: Notify,
    rules: Notify,
    alert: Notify,
    secret_refresh: Notify,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    pub fn new() -> Self {
        Self {
            browser: Notify::new(),
            rules: Notify::new(),
            alert: Notify::new(),
            secret_refresh: Notify::new(),
        }
    }

    fn channel(&self, kind: JobKind) -> &Notify {
        match kind {
            JobKind::Browser => &self.browser,
            JobKind::Rules => &self.rules,
            JobKind::Alert => &self.alert,
            JobKind::SecretRefresh => &self.secret_refresh,
        }
    }

    /// Wake every waiter currently subscribed to `kind`.
    pub fn notify(&self, kind: JobKind) {
        self.channel(kind).notify_waiters();
    }

    /// Wait for a wake on `kind`, or until `wait_window` elapses, whichever
    /// comes first. Always returns, even with no notification (the caller
    /// re-polls the store either way).
    pub async fn wait(&self, kind: JobKind, wait_window: Duration) {
        let notified = self.channel(kind).notified();
        tokio::select! {
            _ = notified => {}
            _ = tokio::time::sleep(wait_window) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn notify_wakes_a_pending_waiter() {
        let notifier = Notifier::new();

        let waiter = async {
            notifier.wait(JobKind::Rules, Duration::from_secs(5)).await;
        };

        tokio::select! {
            _ = waiter => {}
            _ = async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                notifier.notify(JobKind::Rules);
                tokio::time::sleep(Duration::from_secs(10)).await;
            } => {
                panic!("waiter did not wake before the fallback branch");
            }
        }
    }

    #[tokio::test]
    async fn wait_times_out_without_a_notification() {
        let notifier = Notifier::new();
        let start = tokio::time::Instant::now();
        notifier.wait(JobKind::Browser, Duration::from_millis(20)).await;
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn channels_are_independent_per_kind() {
        let notifier = Notifier::new();
        notifier.notify(JobKind::Alert);

        // A waiter on a different kind should still hit the timeout branch.
        let start = tokio::time::Instant::now();
        notifier
            .wait(JobKind::SecretRefresh, Duration::from_millis(20))
            .await;
        assert!(start.elapsed() >= Duration::from_millis(20));
    }
}

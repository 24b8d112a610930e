//! C4.4: the IOC version stamp — a keyed counter in the shared cache with
//! a short process-local refresh window, so every IOC host cache key can
//! embed the current version and a `Bump()` invalidates all of them at
//! once without a scan.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

use crate::kernel::cache::shared::SharedCache;

const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

struct LocalCopy {
    version: String,
    fetched_at: Instant,
}

pub struct VersionStamp {
    shared: Arc<dyn SharedCache>,
    key: String,
    refresh_interval: Duration,
    local: Mutex<Option<LocalCopy>>,
}

impl VersionStamp {
    pub fn new(shared: Arc<dyn SharedCache>, key: impl Into<String>) -> Self {
        Self {
            shared,
            key: key.into(),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            local: Mutex::new(None),
        }
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// Returns the cached version, refreshing from the shared tier if the
    /// local copy is stale. On a shared-cache error, keeps serving the
    /// last known value rather than failing the caller.
    pub async fn current(&self) -> String {
        {
            let local = self.local.lock();
            if let Some(copy) = local.as_ref() {
                if copy.fetched_at.elapsed() < self.refresh_interval {
                    return copy.version.clone();
                }
            }
        }

        match self.shared.get(&self.key).await {
            Ok(Some(version)) => {
                self.store_local(version.clone());
                version
            }
            Ok(None) => {
                // No stamp yet: initialize one, matching `Bump`'s token format.
                let version = self.bump().await;
                version
            }
            Err(err) => {
                tracing::warn!(error = %err, key = %self.key, "version stamp refresh failed, using last known value");
                let local = self.local.lock();
                local
                    .as_ref()
                    .map(|c| c.version.clone())
                    .unwrap_or_else(|| "0".to_string())
            }
        }
    }

    /// Writes a fresh monotonic token and updates the local copy
    /// immediately, regardless of whether the shared write succeeds (a
    /// failed bump still moves local readers forward; cross-process
    /// consistency catches up once the shared write is retried or the
    /// local refresh window next expires).
    pub async fn bump(&self) -> String {
        let token = Self::generate_token();
        if let Err(err) = self.shared.set(&self.key, &token, None).await {
            tracing::warn!(error = %err, key = %self.key, "version stamp bump failed to persist to shared cache");
        }
        self.store_local(token.clone());
        token
    }

    fn store_local(&self, version: String) {
        *self.local.lock() = Some(LocalCopy {
            version,
            fetched_at: Instant::now(),
        });
    }

    fn generate_token() -> String {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        to_base36(nanos)
    }
}

fn to_base36(mut n: u128) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut buf = Vec::new();
    while n > 0 {
        buf.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    buf.reverse();
    String::from_utf8(buf).unwrap()
}

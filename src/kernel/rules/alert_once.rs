//! C7: the alert-once cache. Guarantees "exactly one first sighting"
//! per `(site, scope, dedupe_key)`, in-process via a 256-way striped
//! lock and cross-process via the shared tier's atomic
//! `SetIfNotExists`.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::common::AppError;
use crate::kernel::cache::local_lru::LocalLruCache;
use crate::kernel::cache::shared::SharedCache;

const STRIPE_COUNT: usize = 256;
const PRESENT: &str = "1";

#[derive(Debug, Clone)]
pub struct AlertOnceRequest {
    pub site_id: Uuid,
    pub scope: String,
    pub dedupe_key: String,
    pub ttl: Duration,
}

impl AlertOnceRequest {
    fn validate(&self) -> Result<(), AppError> {
        if self.site_id.is_nil() {
            return Err(AppError::InvalidInput("site_id must not be empty".into()));
        }
        if self.scope.trim().is_empty() {
            return Err(AppError::InvalidInput("scope must not be empty".into()));
        }
        if self.dedupe_key.trim().is_empty() {
            return Err(AppError::InvalidInput("dedupe_key must not be empty".into()));
        }
        Ok(())
    }

    fn key(&self) -> String {
        format!(
            "rules:alertonce:site:{}:scope:{}:key:{}",
            self.site_id,
            self.scope,
            self.dedupe_key.trim().to_lowercase()
        )
    }
}

pub struct AlertOnceCache {
    local: LocalLruCache<String, String>,
    shared: Option<Arc<dyn SharedCache>>,
    stripes: Vec<tokio::sync::Mutex<()>>,
}

impl AlertOnceCache {
    pub fn new(local_capacity: usize, shared: Option<Arc<dyn SharedCache>>) -> Self {
        Self {
            local: LocalLruCache::new(local_capacity),
            shared,
            stripes: (0..STRIPE_COUNT).map(|_| tokio::sync::Mutex::new(())).collect(),
        }
    }

    fn stripe_for(&self, key: &str) -> &tokio::sync::Mutex<()> {
        let hash = seahash(key);
        &self.stripes[(hash % STRIPE_COUNT as u64) as usize]
    }

    /// Returns whether `req` has already been seen. At most one in-process
    /// caller per key enters the shared-cache step at a time; across
    /// processes, `SetIfNotExists`'s atomicity guarantees exactly one
    /// "first" sighting globally.
    pub async fn seen(&self, req: &AlertOnceRequest) -> Result<bool, AppError> {
        req.validate()?;
        let key = req.key();

        let _guard = self.stripe_for(&key).lock().await;

        if self.local.exists(&key) {
            return Ok(true);
        }

        let Some(shared) = &self.shared else {
            self.local.set(key, PRESENT.to_string(), Some(req.ttl));
            return Ok(false);
        };

        let did_set = shared
            .set_if_not_exists(&key, PRESENT, Some(req.ttl))
            .await
            .map_err(|e| wrap_with_key(e, &key))?;

        self.local.set(key, PRESENT.to_string(), Some(req.ttl));
        Ok(!did_set)
    }

    /// Non-mutating check. A local hit is authoritative; otherwise consults
    /// the shared tier's `Exists` and seeds local only when present.
    pub async fn peek(&self, req: &AlertOnceRequest) -> Result<bool, AppError> {
        req.validate()?;
        let key = req.key();

        if self.local.exists(&key) {
            return Ok(true);
        }

        let Some(shared) = &self.shared else {
            return Ok(false);
        };

        let present = shared.exists(&key).await.map_err(|e| wrap_with_key(e, &key))?;
        if present && !req.ttl.is_zero() {
            self.local.set(key, PRESENT.to_string(), Some(req.ttl));
        }
        Ok(present)
    }
}

fn wrap_with_key(err: AppError, key: &str) -> AppError {
    AppError::CacheBackend(anyhow::anyhow!("{err} (key: {key})"))
}

/// A small non-cryptographic string hash, good enough for stripe selection.
fn seahash(s: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in s.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

//! C4 typed cache: global IOC (indicator-of-compromise) lookups, keyed by
//! host and versioned via [`VersionStamp`] (C4.4) so a `Bump()` invalidates
//! every cached host entry atomically without a scan. Supports negative
//! caching (a reserved marker for "looked up, not found") and self-heals
//! by deleting any cache entry that fails to deserialize.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::AppError;
use crate::kernel::cache::local_lru::LocalLruCache;
use crate::kernel::cache::metrics::{CacheEvent, CacheMetrics, CacheOp, CacheTier};
use crate::kernel::cache::shared::SharedCache;
use crate::kernel::cache::version_stamp::VersionStamp;

const NEGATIVE_MARKER: &str = "__not_found__";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IocRecord {
    pub id: Uuid,
    pub ioc_type: String,
    pub value: String,
    pub description: Option<String>,
}

#[async_trait]
pub trait IocStore: Send + Sync {
    async fn find_by_host(&self, host: &str) -> Result<Option<IocRecord>, AppError>;
}

pub struct IocCache {
    local: LocalLruCache<String, String>,
    shared: Option<Arc<dyn SharedCache>>,
    store: Arc<dyn IocStore>,
    version: Arc<VersionStamp>,
    ttl: Duration,
    metrics: Arc<dyn CacheMetrics>,
}

impl IocCache {
    pub fn new(
        local_capacity: usize,
        shared: Option<Arc<dyn SharedCache>>,
        store: Arc<dyn IocStore>,
        version: Arc<VersionStamp>,
        ttl: Duration,
        metrics: Arc<dyn CacheMetrics>,
    ) -> Self {
        Self {
            local: LocalLruCache::new(local_capacity),
            shared,
            store,
            version,
            ttl,
            metrics,
        }
    }

    async fn key_for(&self, host: &str) -> String {
        let version = self.version.current().await;
        format!("rules:ioc:host:v{version}:{host}")
    }

    pub async fn lookup_host(&self, host: &str) -> Result<Option<IocRecord>, AppError> {
        let host = host.trim().to_lowercase();
        let key = self.key_for(&host).await;

        if let Some(raw) = self.local.get(&key) {
            self.emit(CacheTier::Local, CacheOp::Hit, true);
            return self.decode(&key, &raw, false).await;
        }
        self.emit(CacheTier::Local, CacheOp::Miss, true);

        if let Some(shared) = &self.shared {
            match shared.get(&key).await {
                Ok(Some(raw)) => {
                    self.emit(CacheTier::Shared, CacheOp::Hit, true);
                    return self.decode(&key, &raw, true).await;
                }
                Ok(None) => {
                    self.emit(CacheTier::Shared, CacheOp::Miss, true);
                }
                Err(err) => {
                    self.emit(CacheTier::Shared, CacheOp::Miss, false);
                    tracing::warn!(error = %err, "ioc cache shared tier error, falling through to store");
                }
            }
        }

        let found = self.store.find_by_host(&host).await?;
        self.emit(
            CacheTier::Store,
            if found.is_some() { CacheOp::Hit } else { CacheOp::Miss },
            true,
        );

        match &found {
            Some(record) => self.write_through(&key, &serde_json::to_string(record)?).await,
            None => self.write_through(&key, NEGATIVE_MARKER).await,
        }

        Ok(found)
    }

    /// Decode a raw cached value; a corrupted value is deleted from both
    /// tiers (self-heal) and treated as a miss so the caller re-resolves
    /// from the store.
    async fn decode(
        &self,
        key: &str,
        raw: &str,
        write_through_local: bool,
    ) -> Result<Option<IocRecord>, AppError> {
        if raw == NEGATIVE_MARKER {
            if write_through_local {
                self.local.set(key.to_string(), raw.to_string(), Some(self.ttl));
            }
            return Ok(None);
        }

        match serde_json::from_str::<IocRecord>(raw) {
            Ok(record) => {
                if write_through_local {
                    self.local.set(key.to_string(), raw.to_string(), Some(self.ttl));
                }
                Ok(Some(record))
            }
            Err(err) => {
                tracing::warn!(error = %err, key, "corrupted ioc cache entry, self-healing");
                self.local.delete(&key.to_string());
                if let Some(shared) = &self.shared {
                    let _ = shared.delete(key).await;
                }
                let host = key
                    .rsplit(':')
                    .next()
                    .map(|s| s.to_string())
                    .unwrap_or_default();
                let found = self.store.find_by_host(&host).await?;
                match &found {
                    Some(record) => self.write_through(key, &serde_json::to_string(record)?).await,
                    None => self.write_through(key, NEGATIVE_MARKER).await,
                }
                Ok(found)
            }
        }
    }

    async fn write_through(&self, key: &str, raw: &str) {
        if let Some(shared) = &self.shared {
            if let Err(err) = shared.set(key, raw, Some(self.ttl)).await {
                self.emit(CacheTier::Shared, CacheOp::Write, false);
                tracing::warn!(error = %err, "ioc cache shared tier write-through failed");
            } else {
                self.emit(CacheTier::Shared, CacheOp::Write, true);
            }
        }
        self.local.set(key.to_string(), raw.to_string(), Some(self.ttl));
        self.emit(CacheTier::Local, CacheOp::Write, true);
    }

    fn emit(&self, tier: CacheTier, op: CacheOp, ok: bool) {
        self.metrics.record(CacheEvent { name: "ioc", tier, op, ok });
    }
}

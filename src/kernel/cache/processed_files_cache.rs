//! C4 typed cache: processed-files dedupe, `Local(C1) -> Shared(C2) ->
//! Store(C3)`, keyed by `(scope, content hash)`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::common::AppError;
use crate::kernel::cache::local_lru::LocalLruCache;
use crate::kernel::cache::metrics::{CacheEvent, CacheMetrics, CacheOp, CacheTier};
use crate::kernel::cache::shared::SharedCache;

#[async_trait]
pub trait ProcessedFilesStore: Send + Sync {
    async fn is_processed(&self, scope: &str, hash: &str) -> Result<bool, AppError>;
    /// Idempotent: inserting the same `(scope, hash)` twice must not error.
    async fn mark_processed(&self, scope: &str, hash: &str, storage_key: &str) -> Result<(), AppError>;
}

const PRESENT: &str = "1";

pub struct ProcessedFilesCache {
    local: LocalLruCache<String, String>,
    shared: Option<Arc<dyn SharedCache>>,
    store: Arc<dyn ProcessedFilesStore>,
    ttl: Duration,
    metrics: Arc<dyn CacheMetrics>,
}

impl ProcessedFilesCache {
    pub fn new(
        local_capacity: usize,
        shared: Option<Arc<dyn SharedCache>>,
        store: Arc<dyn ProcessedFilesStore>,
        ttl: Duration,
        metrics: Arc<dyn CacheMetrics>,
    ) -> Self {
        Self {
            local: LocalLruCache::new(local_capacity),
            shared,
            store,
            ttl,
            metrics,
        }
    }

    fn key(scope: &str, hash: &str) -> String {
        format!("rules:processed:scope:{scope}:hash:{}", hash.trim().to_lowercase())
    }

    pub async fn is_processed(&self, scope: &str, hash: &str) -> Result<bool, AppError> {
        let key = Self::key(scope, hash);

        if self.local.exists(&key) {
            self.emit(CacheTier::Local, CacheOp::Hit, true);
            return Ok(true);
        }
        self.emit(CacheTier::Local, CacheOp::Miss, true);

        if let Some(shared) = &self.shared {
            match shared.exists(&key).await {
                Ok(true) => {
                    self.emit(CacheTier::Shared, CacheOp::Hit, true);
                    self.local.set(key, PRESENT.to_string(), Some(self.ttl));
                    return Ok(true);
                }
                Ok(false) => self.emit(CacheTier::Shared, CacheOp::Miss, true),
                Err(err) => {
                    self.emit(CacheTier::Shared, CacheOp::Miss, false);
                    tracing::warn!(error = %err, "processed-files shared tier error, falling through to store");
                }
            }
        }

        let found = self.store.is_processed(scope, hash).await?;
        self.emit(CacheTier::Store, if found { CacheOp::Hit } else { CacheOp::Miss }, true);

        if found {
            if let Some(shared) = &self.shared {
                let _ = shared.set(&key, PRESENT, Some(self.ttl)).await;
            }
            self.local.set(key, PRESENT.to_string(), Some(self.ttl));
        }

        Ok(found)
    }

    pub async fn mark_processed(
        &self,
        scope: &str,
        hash: &str,
        storage_key: &str,
    ) -> Result<(), AppError> {
        if storage_key.trim().is_empty() {
            return Err(AppError::InvalidInput("storage_key must not be empty".into()));
        }

        self.store.mark_processed(scope, hash, storage_key).await?;
        self.emit(CacheTier::Store, CacheOp::Write, true);

        let key = Self::key(scope, hash);
        if let Some(shared) = &self.shared {
            if let Err(err) = shared.set(&key, PRESENT, Some(self.ttl)).await {
                self.emit(CacheTier::Shared, CacheOp::Write, false);
                tracing::warn!(error = %err, "processed-files shared tier write-through failed");
            } else {
                self.emit(CacheTier::Shared, CacheOp::Write, true);
            }
        }
        self.local.set(key, PRESENT.to_string(), Some(self.ttl));
        self.emit(CacheTier::Local, CacheOp::Write, true);

        Ok(())
    }

    fn emit(&self, tier: CacheTier, op: CacheOp, ok: bool) {
        self.metrics.record(CacheEvent { name: "processed_files", tier, op, ok });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::cache::metrics::NoopCacheMetrics;
    use std::collections::HashSet;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct FakeStore {
        processed: StdMutex<HashSet<(String, String)>>,
    }

    #[async_trait]
    impl ProcessedFilesStore for FakeStore {
        async fn is_processed(&self, scope: &str, hash: &str) -> Result<bool, AppError> {
            Ok(self
                .processed
                .lock()
                .unwrap()
                .contains(&(scope.to_string(), hash.to_lowercase())))
        }

        async fn mark_processed(&self, scope: &str, hash: &str, _storage_key: &str) -> Result<(), AppError> {
            self.processed
                .lock()
                .unwrap()
                .insert((scope.to_string(), hash.to_lowercase()));
            Ok(())
        }
    }

    fn cache(store: Arc<FakeStore>) -> ProcessedFilesCache {
        ProcessedFilesCache::new(16, None, store, Duration::from_secs(60), Arc::new(NoopCacheMetrics))
    }

    #[tokio::test]
    async fn rejects_empty_storage_key() {
        let c = cache(Arc::new(FakeStore::default()));
        let err = c.mark_processed("scope", "abc123", "  ").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn mark_then_is_processed_round_trips() {
        let c = cache(Arc::new(FakeStore::default()));
        c.mark_processed("scope", "abc123", "s3://bucket/key").await.unwrap();
        assert!(c.is_processed("scope", "abc123").await.unwrap());
    }

    #[tokio::test]
    async fn marking_twice_is_idempotent() {
        let c = cache(Arc::new(FakeStore::default()));
        c.mark_processed("scope", "abc123", "s3://bucket/key").await.unwrap();
        c.mark_processed("scope", "abc123", "s3://bucket/key2").await.unwrap();
        assert!(c.is_processed("scope", "abc123").await.unwrap());
    }
}

//! C4 typed cache: seen-domains, `Local(C1) -> Shared(C2) -> Store(C3)`.
//!
//! New code — the teacher has no rules engine — built in the teacher's
//! house style (async trait + struct, `tracing` on tier transitions,
//! `anyhow`/`AppError` returns, colocated unit tests).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::common::AppError;
use crate::kernel::cache::local_lru::LocalLruCache;
use crate::kernel::cache::metrics::{CacheEvent, CacheMetrics, CacheOp, CacheTier};
use crate::kernel::cache::shared::SharedCache;

/// The C3 durable-store side of the seen-domains cache.
#[async_trait]
pub trait SeenDomainsStore: Send + Sync {
    async fn exists(&self, scope: &str, domain: &str) -> Result<bool, AppError>;
    async fn record(&self, scope: &str, domain: &str) -> Result<(), AppError>;
}

const PRESENT: &str = "1";

pub struct SeenDomainsCache {
    local: LocalLruCache<String, String>,
    shared: Option<Arc<dyn SharedCache>>,
    store: Arc<dyn SeenDomainsStore>,
    ttl: Duration,
    metrics: Arc<dyn CacheMetrics>,
}

impl SeenDomainsCache {
    pub fn new(
        local_capacity: usize,
        shared: Option<Arc<dyn SharedCache>>,
        store: Arc<dyn SeenDomainsStore>,
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

    fn key(scope: &str, domain: &str) -> String {
        format!("rules:seen:scope:{}:domain:{}", scope, domain.trim().to_lowercase())
    }

    pub async fn exists(&self, scope: &str, domain: &str) -> Result<bool, AppError> {
        let key = Self::key(scope, domain);

        if self.local.exists(&key) {
            self.emit("seen_domains", CacheTier::Local, CacheOp::Hit, true);
            return Ok(true);
        }
        self.emit("seen_domains", CacheTier::Local, CacheOp::Miss, true);

        if let Some(shared) = &self.shared {
            match shared.exists(&key).await {
                Ok(true) => {
                    self.emit("seen_domains", CacheTier::Shared, CacheOp::Hit, true);
                    self.local.set(key, PRESENT.to_string(), Some(self.ttl));
                    return Ok(true);
                }
                Ok(false) => {
                    self.emit("seen_domains", CacheTier::Shared, CacheOp::Miss, true);
                }
                Err(err) => {
                    self.emit("seen_domains", CacheTier::Shared, CacheOp::Miss, false);
                    tracing::warn!(error = %err, "seen-domains shared tier error, falling through to store");
                }
            }
        }

        let found = self.store.exists(scope, domain).await?;
        self.emit("seen_domains", CacheTier::Store, if found { CacheOp::Hit } else { CacheOp::Miss }, true);

        if found {
            if let Some(shared) = &self.shared {
                let _ = shared.set(&key, PRESENT, Some(self.ttl)).await;
            }
            self.local.set(key, PRESENT.to_string(), Some(self.ttl));
        }

        Ok(found)
    }

    pub async fn record(&self, scope: &str, domain: &str) -> Result<(), AppError> {
        self.store.record(scope, domain).await?;
        self.emit("seen_domains", CacheTier::Store, CacheOp::Write, true);

        let key = Self::key(scope, domain);
        if let Some(shared) = &self.shared {
            if let Err(err) = shared.set(&key, PRESENT, Some(self.ttl)).await {
                self.emit("seen_domains", CacheTier::Shared, CacheOp::Write, false);
                tracing::warn!(error = %err, "seen-domains shared tier write-through failed");
            } else {
                self.emit("seen_domains", CacheTier::Shared, CacheOp::Write, true);
            }
        }
        self.local.set(key, PRESENT.to_string(), Some(self.ttl));
        self.emit("seen_domains", CacheTier::Local, CacheOp::Write, true);

        Ok(())
    }

    fn emit(&self, name: &'static str, tier: CacheTier, op: CacheOp, ok: bool) {
        self.metrics.record(CacheEvent { name, tier, op, ok });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::cache::metrics::NoopCacheMetrics;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct FakeStore {
        seen: StdMutex<std::collections::HashSet<(String, String)>>,
    }

    #[async_trait]
    impl SeenDomainsStore for FakeStore {
        async fn exists(&self, scope: &str, domain: &str) -> Result<bool, AppError> {
            Ok(self
                .seen
                .lock()
                .unwrap()
                .contains(&(scope.to_string(), domain.to_lowercase())))
        }

        async fn record(&self, scope: &str, domain: &str) -> Result<(), AppError> {
            self.seen
                .lock()
                .unwrap()
                .insert((scope.to_string(), domain.to_lowercase()));
            Ok(())
        }
    }

    fn cache_without_shared(store: Arc<FakeStore>) -> SeenDomainsCache {
        SeenDomainsCache::new(16, None, store, Duration::from_secs(60), Arc::new(NoopCacheMetrics))
    }

    #[tokio::test]
    async fn unseen_domain_is_not_found() {
        let cache = cache_without_shared(Arc::new(FakeStore::default()));
        assert!(!cache.exists("siteA", "evil.example").await.unwrap());
    }

    #[tokio::test]
    async fn record_then_exists_hits_local_without_touching_store_again() {
        let store = Arc::new(FakeStore::default());
        let cache = cache_without_shared(store.clone());

        cache.record("siteA", "Evil.Example").await.unwrap();
        assert!(cache.exists("siteA", "evil.example").await.unwrap());
    }

    #[tokio::test]
    async fn store_hit_is_write_through_to_local() {
        let store = Arc::new(FakeStore::default());
        store.record("siteA", "preexisting.example").await.unwrap();

        let cache = cache_without_shared(store);
        assert!(cache.exists("siteA", "preexisting.example").await.unwrap());
        // second call must be served from local without error
        assert!(cache.exists("siteA", "preexisting.example").await.unwrap());
    }

    #[test]
    fn key_lowercases_and_trims_the_domain() {
        assert_eq!(
            SeenDomainsCache::key("scope", "  Example.COM  "),
            "rules:seen:scope:scope:domain:example.com"
        );
    }
}

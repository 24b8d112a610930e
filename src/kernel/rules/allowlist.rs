//! C6: the allow-list checker. Fetches `patterns(scope) ∪
//! patterns("global")` from an external service and caches the union,
//! fail-closed (deny) on fetch error.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::kernel::rules::pattern::{match_any, Pattern, PatternType};

const GLOBAL_SCOPE: &str = "global";

/// The external allow-list service collaborator.
#[async_trait]
pub trait AllowlistService: Send + Sync {
    async fn fetch_patterns(&self, scope: &str) -> anyhow::Result<Vec<Pattern>>;
}

/// `reqwest`-backed client for the external allow-list service.
pub struct HttpAllowlistService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAllowlistService {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[derive(serde::Deserialize)]
struct RawPattern {
    value: String,
    pattern_type: String,
    enabled: bool,
}

#[async_trait]
impl AllowlistService for HttpAllowlistService {
    async fn fetch_patterns(&self, scope: &str) -> anyhow::Result<Vec<Pattern>> {
        let url = format!("{}/scopes/{}/patterns", self.base_url, scope);
        let raw: Vec<RawPattern> = self.client.get(&url).send().await?.error_for_status()?.json().await?;

        Ok(raw
            .into_iter()
            .filter_map(|p| {
                let pattern_type = match p.pattern_type.as_str() {
                    "exact" => PatternType::Exact,
                    "wildcard" => PatternType::Wildcard,
                    "glob" => PatternType::Glob,
                    "etld_plus_one" => PatternType::EtldPlusOne,
                    _ => return None,
                };
                Some(Pattern {
                    value: p.value,
                    pattern_type,
                    enabled: p.enabled,
                })
            })
            .collect())
    }
}

struct CacheEntry {
    patterns: Vec<Pattern>,
    expires_at: Instant,
}

pub struct AllowlistChecker {
    service: Arc<dyn AllowlistService>,
    cache: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
    max_size: usize,
    fetch_timeout: Duration,
}

impl AllowlistChecker {
    pub fn new(
        service: Arc<dyn AllowlistService>,
        ttl: Duration,
        max_size: usize,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            service,
            cache: Mutex::new(HashMap::new()),
            ttl,
            max_size,
            fetch_timeout,
        }
    }

    pub async fn allowed(&self, scope: &str, domain: &str) -> bool {
        if let Some(patterns) = self.cached(scope) {
            return match_any(domain, &patterns);
        }

        match tokio::time::timeout(self.fetch_timeout, self.fetch_union(scope)).await {
            Ok(Ok(patterns)) => {
                self.store(scope, patterns.clone());
                match_any(domain, &patterns)
            }
            Ok(Err(err)) => {
                tracing::warn!(scope, error = %err, "allow-list fetch failed, denying (fail-closed)");
                false
            }
            Err(_) => {
                tracing::warn!(scope, "allow-list fetch timed out, denying (fail-closed)");
                false
            }
        }
    }

    async fn fetch_union(&self, scope: &str) -> anyhow::Result<Vec<Pattern>> {
        let (scoped, global) = tokio::try_join!(
            self.service.fetch_patterns(scope),
            self.service.fetch_patterns(GLOBAL_SCOPE),
        )?;
        let mut union = scoped;
        union.extend(global);
        Ok(union)
    }

    fn cached(&self, scope: &str) -> Option<Vec<Pattern>> {
        let mut cache = self.cache.lock();
        match cache.get(scope) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.patterns.clone()),
            Some(_) => {
                cache.remove(scope);
                None
            }
            None => None,
        }
    }

    fn store(&self, scope: &str, patterns: Vec<Pattern>) {
        let mut cache = self.cache.lock();

        if cache.len() >= self.max_size && !cache.contains_key(scope) {
            if let Some(earliest) = cache
                .iter()
                .min_by_key(|(_, e)| e.expires_at)
                .map(|(k, _)| k.clone())
            {
                cache.remove(&earliest);
            }
        }

        cache.insert(
            scope.to_string(),
            CacheEntry {
                patterns,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Invalidate a single scope's cached union.
    pub fn invalidate(&self, scope: &str) {
        self.cache.lock().remove(scope);
    }

    /// Invalidate every cached union.
    pub fn invalidate_all(&self) {
        self.cache.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FakeService {
        scoped: Vec<Pattern>,
        global: Vec<Pattern>,
        calls: AtomicU32,
        fail: bool,
    }

    #[async_trait]
    impl AllowlistService for FakeService {
        async fn fetch_patterns(&self, scope: &str) -> anyhow::Result<Vec<Pattern>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("service unavailable");
            }
            Ok(if scope == GLOBAL_SCOPE {
                self.global.clone()
            } else {
                self.scoped.clone()
            })
        }
    }

    fn exact(value: &str) -> Pattern {
        Pattern {
            value: value.to_string(),
            pattern_type: PatternType::Exact,
            enabled: true,
        }
    }

    #[tokio::test]
    async fn allowed_domain_in_scoped_patterns() {
        let service = Arc::new(FakeService {
            scoped: vec![exact("trusted.example")],
            global: vec![],
            calls: AtomicU32::new(0),
            fail: false,
        });
        let checker = AllowlistChecker::new(service, Duration::from_secs(60), 10, Duration::from_secs(1));

        assert!(checker.allowed("siteA", "trusted.example").await);
        assert!(!checker.allowed("siteA", "untrusted.example").await);
    }

    #[tokio::test]
    async fn allowed_domain_in_global_patterns() {
        let service = Arc::new(FakeService {
            scoped: vec![],
            global: vec![exact("cdn.global-provider.example")],
            calls: AtomicU32::new(0),
            fail: false,
        });
        let checker = AllowlistChecker::new(service, Duration::from_secs(60), 10, Duration::from_secs(1));

        assert!(checker.allowed("siteA", "cdn.global-provider.example").await);
    }

    #[tokio::test]
    async fn fetch_error_denies_fail_closed() {
        let service = Arc::new(FakeService {
            scoped: vec![],
            global: vec![],
            calls: AtomicU32::new(0),
            fail: true,
        });
        let checker = AllowlistChecker::new(service, Duration::from_secs(60), 10, Duration::from_secs(1));

        assert!(!checker.allowed("siteA", "anything.example").await);
    }

    #[tokio::test]
    async fn second_call_is_served_from_cache() {
        let service = Arc::new(FakeService {
            scoped: vec![exact("trusted.example")],
            global: vec![],
            calls: AtomicU32::new(0),
            fail: false,
        });
        let checker = AllowlistChecker::new(service.clone(), Duration::from_secs(60), 10, Duration::from_secs(1));

        checker.allowed("siteA", "trusted.example").await;
        checker.allowed("siteA", "trusted.example").await;

        assert_eq!(service.calls.load(Ordering::SeqCst), 2, "one scoped + one global fetch, cached thereafter");
    }

    #[tokio::test]
    async fn invalidate_forces_a_refetch() {
        let service = Arc::new(FakeService {
            scoped: vec![exact("trusted.example")],
            global: vec![],
            calls: AtomicU32::new(0),
            fail: false,
        });
        let checker = AllowlistChecker::new(service.clone(), Duration::from_secs(60), 10, Duration::from_secs(1));

        checker.allowed("siteA", "trusted.example").await;
        checker.invalidate("siteA");
        checker.allowed("siteA", "trusted.example").await;

        assert_eq!(service.calls.load(Ordering::SeqCst), 4);
    }
}

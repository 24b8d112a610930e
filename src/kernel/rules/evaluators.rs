//! C8: the rule evaluators — unknown-domain and IOC — that turn cache
//! lookups into alerts.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::common::AppError;
use crate::kernel::cache::ioc_cache::IocCache;
use crate::kernel::cache::seen_domains_cache::SeenDomainsCache;
use crate::kernel::rules::alert_once::{AlertOnceCache, AlertOnceRequest};
use crate::kernel::rules::allowlist::AllowlistChecker;

/// Context carried through to the alert's event payload, common to both
/// evaluators.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Attribution {
    pub job_id: Option<Uuid>,
    pub event_id: Option<Uuid>,
    pub request_url: Option<String>,
    pub page_url: Option<String>,
    pub referrer: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[sqlx(type_name = "alert_severity", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

/// The C3 durable-store side of alert creation.
#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn create_alert(
        &self,
        alert_type: &str,
        severity: AlertSeverity,
        scope: &str,
        site_id: Option<Uuid>,
        event_context: serde_json::Value,
    ) -> Result<Uuid, AppError>;
}

pub struct UnknownDomainRequest {
    pub scope: String,
    pub domain: String,
    pub site_id: Option<Uuid>,
    pub attribution: Attribution,
}

pub struct UnknownDomainEvaluator {
    allowlist: Arc<AllowlistChecker>,
    seen: Arc<SeenDomainsCache>,
    store: Arc<dyn AlertStore>,
}

impl UnknownDomainEvaluator {
    pub fn new(
        allowlist: Arc<AllowlistChecker>,
        seen: Arc<SeenDomainsCache>,
        store: Arc<dyn AlertStore>,
    ) -> Self {
        Self { allowlist, seen, store }
    }

    /// Returns `alerted`: whether a new `unknown_domain` alert was created.
    pub async fn evaluate(&self, req: UnknownDomainRequest) -> Result<bool, AppError> {
        let domain = req.domain.trim().to_lowercase();
        if domain.is_empty() {
            return Ok(false);
        }

        if self.allowlist.allowed(&req.scope, &domain).await {
            self.seen.record(&req.scope, &domain).await?;
            return Ok(false);
        }

        if self.seen.exists(&req.scope, &domain).await? {
            return Ok(false);
        }

        let context = serde_json::json!({
            "domain": domain,
            "scope": req.scope,
            "site_id": req.site_id,
            "job_id": req.attribution.job_id,
            "event_id": req.attribution.event_id,
            "request_url": req.attribution.request_url,
            "page_url": req.attribution.page_url,
            "referrer": req.attribution.referrer,
            "user_agent": req.attribution.user_agent,
        });

        self.store
            .create_alert("unknown_domain", AlertSeverity::Medium, &req.scope, req.site_id, context)
            .await?;

        self.seen.record(&req.scope, &domain).await?;
        Ok(true)
    }

    /// Records the domain without creating an alert; still short-circuits
    /// when allow-listed.
    pub async fn preview(&self, req: UnknownDomainRequest) -> Result<(), AppError> {
        let domain = req.domain.trim().to_lowercase();
        if domain.is_empty() {
            return Ok(());
        }
        if self.allowlist.allowed(&req.scope, &domain).await {
            self.seen.record(&req.scope, &domain).await?;
            return Ok(());
        }
        self.seen.record(&req.scope, &domain).await
    }
}

pub struct IocEvalRequest {
    pub scope: String,
    pub host: String,
    pub site_id: Option<Uuid>,
    pub attribution: Attribution,
}

pub struct IocEvaluator {
    ioc_cache: Arc<IocCache>,
    alert_once: Arc<AlertOnceCache>,
    store: Arc<dyn AlertStore>,
    alert_ttl: Duration,
}

impl IocEvaluator {
    pub fn new(
        ioc_cache: Arc<IocCache>,
        alert_once: Arc<AlertOnceCache>,
        store: Arc<dyn AlertStore>,
        alert_ttl: Duration,
    ) -> Self {
        Self {
            ioc_cache,
            alert_once,
            store,
            alert_ttl,
        }
    }

    /// Returns `alerted`: whether a new `ioc_domain` alert was created.
    pub async fn evaluate(&self, req: IocEvalRequest) -> Result<bool, AppError> {
        let host = req.host.trim().to_lowercase();
        if host.is_empty() {
            return Ok(false);
        }

        let Some(ioc) = self.ioc_cache.lookup_host(&host).await? else {
            return Ok(false);
        };

        let site_id = req.site_id.unwrap_or_default();
        let seen = self
            .alert_once
            .seen(&AlertOnceRequest {
                site_id,
                scope: req.scope.clone(),
                dedupe_key: format!("ioc:{}", ioc.id),
                ttl: self.alert_ttl,
            })
            .await?;
        if seen {
            return Ok(false);
        }

        let context = serde_json::json!({
            "ioc_id": ioc.id,
            "ioc_type": ioc.ioc_type,
            "ioc_value": ioc.value,
            "ioc_description": ioc.description,
            "host": host,
            "scope": req.scope,
            "site_id": req.site_id,
            "job_id": req.attribution.job_id,
            "event_id": req.attribution.event_id,
            "request_url": req.attribution.request_url,
            "page_url": req.attribution.page_url,
            "referrer": req.attribution.referrer,
            "user_agent": req.attribution.user_agent,
        });

        self.store
            .create_alert("ioc_domain", AlertSeverity::High, &req.scope, req.site_id, context)
            .await?;

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::cache::ioc_cache::{IocCache, IocRecord, IocStore};
    use crate::kernel::cache::metrics::NoopCacheMetrics;
    use crate::kernel::cache::shared::SharedCache;
    use crate::kernel::cache::version_stamp::VersionStamp;
    use crate::kernel::rules::allowlist::AllowlistService;
    use crate::kernel::rules::pattern::{Pattern, PatternType};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex as StdMutex;

    struct NullShared;
    #[async_trait]
    impl SharedCache for NullShared {
        async fn get(&self, _key: &str) -> Result<Option<String>, AppError> {
            Ok(None)
        }
        async fn set(&self, _key: &str, _value: &str, _ttl: Option<Duration>) -> Result<(), AppError> {
            Ok(())
        }
        async fn delete(&self, _key: &str) -> Result<bool, AppError> {
            Ok(false)
        }
        async fn exists(&self, _key: &str) -> Result<bool, AppError> {
            Ok(false)
        }
        async fn set_ttl(&self, _key: &str, _ttl: Duration) -> Result<bool, AppError> {
            Ok(false)
        }
        async fn set_if_not_exists(
            &self,
            _key: &str,
            _value: &str,
            _ttl: Option<Duration>,
        ) -> Result<bool, AppError> {
            Ok(true)
        }
        async fn health(&self) -> Result<(), AppError> {
            Ok(())
        }
    }

    struct NoPatternsService;
    #[async_trait]
    impl AllowlistService for NoPatternsService {
        async fn fetch_patterns(&self, _scope: &str) -> anyhow::Result<Vec<Pattern>> {
            Ok(vec![])
        }
    }

    struct AllowAllService;
    #[async_trait]
    impl AllowlistService for AllowAllService {
        async fn fetch_patterns(&self, scope: &str) -> anyhow::Result<Vec<Pattern>> {
            if scope == "global" {
                return Ok(vec![]);
            }
            Ok(vec![Pattern {
                value: "*".into(),
                pattern_type: PatternType::Glob,
                enabled: true,
            }])
        }
    }

    #[derive(Default)]
    struct FakeSeenStore {
        seen: StdMutex<std::collections::HashSet<(String, String)>>,
    }
    #[async_trait]
    impl crate::kernel::cache::seen_domains_cache::SeenDomainsStore for FakeSeenStore {
        async fn exists(&self, scope: &str, domain: &str) -> Result<bool, AppError> {
            Ok(self.seen.lock().unwrap().contains(&(scope.into(), domain.into())))
        }
        async fn record(&self, scope: &str, domain: &str) -> Result<(), AppError> {
            self.seen.lock().unwrap().insert((scope.into(), domain.into()));
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeAlertStore {
        created: AtomicU32,
    }
    #[async_trait]
    impl AlertStore for FakeAlertStore {
        async fn create_alert(
            &self,
            _alert_type: &str,
            _severity: AlertSeverity,
            _scope: &str,
            _site_id: Option<Uuid>,
            _event_context: serde_json::Value,
        ) -> Result<Uuid, AppError> {
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(Uuid::nil())
        }
    }

    fn unknown_domain_request(domain: &str) -> UnknownDomainRequest {
        UnknownDomainRequest {
            scope: "siteA".into(),
            domain: domain.into(),
            site_id: None,
            attribution: Attribution::default(),
        }
    }

    #[tokio::test]
    async fn allowlisted_domain_never_alerts() {
        let allowlist = Arc::new(AllowlistChecker::new(
            Arc::new(AllowAllService),
            Duration::from_secs(60),
            10,
            Duration::from_secs(1),
        ));
        let seen = Arc::new(SeenDomainsCache::new(
            16,
            None,
            Arc::new(FakeSeenStore::default()),
            Duration::from_secs(60),
            Arc::new(NoopCacheMetrics),
        ));
        let alert_store = Arc::new(FakeAlertStore::default());
        let evaluator = UnknownDomainEvaluator::new(allowlist, seen, alert_store.clone());

        let alerted = evaluator.evaluate(unknown_domain_request("cdn.example")).await.unwrap();
        assert!(!alerted);
        assert_eq!(alert_store.created.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_domain_alerts_once_then_is_seen() {
        let allowlist = Arc::new(AllowlistChecker::new(
            Arc::new(NoPatternsService),
            Duration::from_secs(60),
            10,
            Duration::from_secs(1),
        ));
        let seen = Arc::new(SeenDomainsCache::new(
            16,
            None,
            Arc::new(FakeSeenStore::default()),
            Duration::from_secs(60),
            Arc::new(NoopCacheMetrics),
        ));
        let alert_store = Arc::new(FakeAlertStore::default());
        let evaluator = UnknownDomainEvaluator::new(allowlist, seen, alert_store.clone());

        assert!(evaluator.evaluate(unknown_domain_request("sketchy.example")).await.unwrap());
        assert!(!evaluator.evaluate(unknown_domain_request("sketchy.example")).await.unwrap());
        assert_eq!(alert_store.created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_domain_is_a_no_op() {
        let allowlist = Arc::new(AllowlistChecker::new(
            Arc::new(NoPatternsService),
            Duration::from_secs(60),
            10,
            Duration::from_secs(1),
        ));
        let seen = Arc::new(SeenDomainsCache::new(
            16,
            None,
            Arc::new(FakeSeenStore::default()),
            Duration::from_secs(60),
            Arc::new(NoopCacheMetrics),
        ));
        let alert_store = Arc::new(FakeAlertStore::default());
        let evaluator = UnknownDomainEvaluator::new(allowlist, seen, alert_store.clone());

        assert!(!evaluator.evaluate(unknown_domain_request("  ")).await.unwrap());
    }

    #[derive(Default)]
    struct FakeIocStore {
        by_host: StdMutex<HashMap<String, IocRecord>>,
    }
    #[async_trait]
    impl IocStore for FakeIocStore {
        async fn find_by_host(&self, host: &str) -> Result<Option<IocRecord>, AppError> {
            Ok(self.by_host.lock().unwrap().get(host).cloned())
        }
    }

    fn ioc_request(host: &str) -> IocEvalRequest {
        IocEvalRequest {
            scope: "siteA".into(),
            host: host.into(),
            site_id: Some(Uuid::from_u128(7)),
            attribution: Attribution::default(),
        }
    }

    #[tokio::test]
    async fn ioc_hit_alerts_once_per_dedupe_key() {
        let store = Arc::new(FakeIocStore::default());
        store.by_host.lock().unwrap().insert(
            "bad.example".into(),
            IocRecord {
                id: Uuid::from_u128(42),
                ioc_type: "domain".into(),
                value: "bad.example".into(),
                description: None,
            },
        );
        let version = Arc::new(VersionStamp::new(Arc::new(NullShared), "rules:ioc:version"));
        let ioc_cache = Arc::new(IocCache::new(
            16,
            None,
            store,
            version,
            Duration::from_secs(60),
            Arc::new(NoopCacheMetrics),
        ));
        let alert_once = Arc::new(AlertOnceCache::new(16, None));
        let alert_store = Arc::new(FakeAlertStore::default());
        let evaluator = IocEvaluator::new(ioc_cache, alert_once, alert_store.clone(), Duration::from_secs(300));

        assert!(evaluator.evaluate(ioc_request("bad.example")).await.unwrap());
        assert!(!evaluator.evaluate(ioc_request("bad.example")).await.unwrap());
        assert_eq!(alert_store.created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn ioc_miss_never_alerts() {
        let store = Arc::new(FakeIocStore::default());
        let version = Arc::new(VersionStamp::new(Arc::new(NullShared), "rules:ioc:version"));
        let ioc_cache = Arc::new(IocCache::new(
            16,
            None,
            store,
            version,
            Duration::from_secs(60),
            Arc::new(NoopCacheMetrics),
        ));
        let alert_once = Arc::new(AlertOnceCache::new(16, None));
        let alert_store = Arc::new(FakeAlertStore::default());
        let evaluator = IocEvaluator::new(ioc_cache, alert_once, alert_store.clone(), Duration::from_secs(300));

        assert!(!evaluator.evaluate(ioc_request("clean.example")).await.unwrap());
        assert_eq!(alert_store.created.load(Ordering::SeqCst), 0);
    }
}

//! Integration tests against real Postgres/Redis via `testcontainers`,
//! grounded on the teacher's shared-container harness
//! (`packages/server/tests/common/harness.rs`): containers started once,
//! migrations run once, reused across tests in this binary.
//!
//! `#[ignore]`d by default — run explicitly with a Docker daemon
//! available: `cargo test --test infra_integration -- --ignored`.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use testcontainers::core::WaitFor;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};
use testcontainers_modules::redis::Redis;
use tokio::sync::OnceCell;
use uuid::Uuid;

use sitewatch_core::kernel::cache::shared::{RedisSharedCache, SharedCache};
use sitewatch_core::kernel::cache::version_stamp::VersionStamp;
use sitewatch_core::kernel::jobs::model::{CreateJobRequest, JobKind, JobStatus};
use sitewatch_core::kernel::jobs::notifier::Notifier;
use sitewatch_core::kernel::jobs::queue::JobQueue;
use sitewatch_core::kernel::jobs::{FailureNotifier, LoggingFailureSink, PostgresJobQueue};
use sitewatch_core::kernel::store::iocs::{Ioc, IocType, PgIocStore};

struct SharedInfra {
    db_url: String,
    redis_url: String,
    _postgres: ContainerAsync<GenericImage>,
    _redis: ContainerAsync<Redis>,
}

static SHARED: OnceCell<SharedInfra> = OnceCell::const_new();

async fn shared_infra() -> &'static SharedInfra {
    SHARED
        .get_or_init(|| async {
            let postgres = GenericImage::new("postgres", "16")
                .with_wait_for(WaitFor::message_on_stderr("database system is ready to accept connections"))
                .with_exposed_port(testcontainers::core::ContainerPort::Tcp(5432))
                .with_env_var("POSTGRES_PASSWORD", "postgres")
                .with_env_var("POSTGRES_USER", "postgres")
                .with_env_var("POSTGRES_DB", "postgres")
                .start()
                .await
                .expect("failed to start postgres container");

            let pg_host = postgres.get_host().await.unwrap();
            let pg_port = postgres.get_host_port_ipv4(5432).await.unwrap();
            let db_url = format!("postgresql://postgres:postgres@{pg_host}:{pg_port}/postgres");

            let redis = Redis::default().start().await.expect("failed to start redis container");
            let redis_host = redis.get_host().await.unwrap();
            let redis_port = redis.get_host_port_ipv4(6379).await.unwrap();
            let redis_url = format!("redis://{redis_host}:{redis_port}");

            let pool = PgPool::connect(&db_url).await.expect("failed to connect for migrations");
            sqlx::migrate!("./migrations").run(&pool).await.expect("failed to run migrations");
            pool.close().await;

            SharedInfra {
                db_url,
                redis_url,
                _postgres: postgres,
                _redis: redis,
            }
        })
        .await
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn job_lifecycle_round_trips_through_postgres() {
    let infra = shared_infra().await;
    let pool = PgPool::connect(&infra.db_url).await.unwrap();

    let notifier = Arc::new(Notifier::new());
    let failure_notifier = Arc::new(FailureNotifier::new(vec![Arc::new(LoggingFailureSink)]));
    let queue = PostgresJobQueue::new(pool.clone(), notifier, failure_notifier, Duration::from_secs(30));

    let job = queue
        .create(CreateJobRequest {
            job_type: JobKind::Rules,
            payload: serde_json::json!({"event_ids": [], "session_id": Uuid::nil()}),
            metadata: serde_json::json!({}),
            priority: 50,
            site_id: None,
            source_id: None,
            session_id: None,
            is_test: true,
            scheduled_at: None,
            max_retries: 3,
        })
        .await
        .unwrap();
    assert_eq!(job.status, JobStatus::Pending);

    let reserved = queue
        .reserve_next(JobKind::Rules, Duration::from_secs(30), "worker-1")
        .await
        .unwrap()
        .expect("job should be reservable");
    assert_eq!(reserved.id, job.id);
    assert_eq!(reserved.status, JobStatus::Running);

    let completed = queue.complete(job.id, "worker-1").await.unwrap();
    assert!(completed);

    let stats = queue.stats().await.unwrap();
    assert!(stats.completed >= 1);

    pool.close().await;
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn ioc_store_roundtrip_and_version_bump() {
    let infra = shared_infra().await;
    let pool = PgPool::connect(&infra.db_url).await.unwrap();
    let shared_cache = Arc::new(RedisSharedCache::connect(&infra.redis_url).await.unwrap());
    let version = Arc::new(VersionStamp::new(shared_cache.clone(), "test:ioc:version"));
    let store = PgIocStore::new(pool.clone(), version.clone());

    let before = version.current().await;

    let ioc = Ioc::new(IocType::Fqdn, "bad.example", true, None);
    let created = store.create(&ioc).await.unwrap();
    assert_eq!(created.value, "bad.example");

    let after = version.current().await;
    assert_ne!(after, before, "creating an IOC bumps the shared version stamp");

    shared_cache.delete("test:ioc:version").await.unwrap();
    pool.close().await;
}

//! The `SeenDomain` entity (spec §3) and its durable repository, backing
//! the C4 seen-domains cache's store tier.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::common::AppError;
use crate::kernel::cache::seen_domains_cache::SeenDomainsStore;

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct SeenDomainRecord {
    pub site_id: Option<Uuid>,
    pub scope: String,
    pub domain: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub hit_count: i64,
}

pub struct PgSeenDomainsStore {
    pool: PgPool,
}

impl PgSeenDomainsStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find(&self, scope: &str, domain: &str) -> Result<Option<SeenDomainRecord>, AppError> {
        let row = sqlx::query_as::<_, SeenDomainRecord>(
            "SELECT * FROM seen_domains WHERE scope = $1 AND domain = $2",
        )
        .bind(scope)
        .bind(domain)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}

#[async_trait]
impl SeenDomainsStore for PgSeenDomainsStore {
    async fn exists(&self, scope: &str, domain: &str) -> Result<bool, AppError> {
        let domain = domain.trim().to_lowercase();
        let found: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM seen_domains WHERE scope = $1 AND domain = $2",
        )
        .bind(scope)
        .bind(&domain)
        .fetch_optional(&self.pool)
        .await?;
        Ok(found.is_some())
    }

    /// Upsert that increments `hit_count` on repeat sightings (spec §3).
    async fn record(&self, scope: &str, domain: &str) -> Result<(), AppError> {
        let domain = domain.trim().to_lowercase();
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO seen_domains (scope, domain, first_seen_at, last_seen_at, hit_count)
            VALUES ($1, $2, $3, $3, 1)
            ON CONFLICT (scope, domain) DO UPDATE
            SET last_seen_at = EXCLUDED.last_seen_at,
                hit_count = seen_domains.hit_count + 1
            "#,
        )
        .bind(scope)
        .bind(&domain)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

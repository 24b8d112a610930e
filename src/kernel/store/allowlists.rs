//! The `DomainAllowlist` entity (spec §3) and its durable repository, plus
//! a Postgres-backed alternative to the HTTP `AllowlistService` for
//! same-process deployments.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::common::{new_id, AppError};
use crate::kernel::rules::allowlist::AllowlistService;
use crate::kernel::rules::pattern::{Pattern, PatternType};

#[derive(Debug, Clone, TypedBuilder, serde::Serialize, serde::Deserialize)]
#[builder(field_defaults(setter(into)))]
pub struct DomainAllowlist {
    #[builder(default = new_id())]
    pub id: Uuid,
    pub scope: String,
    pub pattern: String,
    pub pattern_type: PatternType,
    #[builder(default = true)]
    pub enabled: bool,
    #[builder(default = 500)]
    pub priority: i32,
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
}

impl DomainAllowlist {
    pub fn validate(&self) -> Result<(), AppError> {
        if !(1..=1000).contains(&self.priority) {
            return Err(AppError::InvalidInput("priority must be in 1..=1000".into()));
        }
        if self.pattern.trim().is_empty() {
            return Err(AppError::InvalidInput("pattern must not be empty".into()));
        }
        Ok(())
    }
}

fn decode_pattern_type(raw: &str) -> Option<PatternType> {
    match raw {
        "exact" => Some(PatternType::Exact),
        "wildcard" => Some(PatternType::Wildcard),
        "glob" => Some(PatternType::Glob),
        "etld_plus_one" => Some(PatternType::EtldPlusOne),
        _ => None,
    }
}

fn encode_pattern_type(pattern_type: PatternType) -> &'static str {
    match pattern_type {
        PatternType::Exact => "exact",
        PatternType::Wildcard => "wildcard",
        PatternType::Glob => "glob",
        PatternType::EtldPlusOne => "etld_plus_one",
    }
}

pub struct PgAllowlistStore {
    pool: PgPool,
}

impl PgAllowlistStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, entry: &DomainAllowlist) -> Result<Uuid, AppError> {
        entry.validate()?;
        let row: (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO domain_allowlists (id, scope, pattern, pattern_type, enabled, priority, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(entry.id)
        .bind(&entry.scope)
        .bind(&entry.pattern)
        .bind(encode_pattern_type(entry.pattern_type))
        .bind(entry.enabled)
        .bind(entry.priority)
        .bind(entry.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    pub async fn list_by_scope(&self, scope: &str) -> Result<Vec<Pattern>, AppError> {
        let rows: Vec<(String, String, bool)> = sqlx::query_as(
            "SELECT pattern, pattern_type, enabled FROM domain_allowlists WHERE scope = $1 ORDER BY priority ASC",
        )
        .bind(scope)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(value, pattern_type, enabled)| {
                decode_pattern_type(&pattern_type).map(|pattern_type| Pattern {
                    value,
                    pattern_type,
                    enabled,
                })
            })
            .collect())
    }
}

/// A same-process alternative to [`HttpAllowlistService`](crate::kernel::rules::allowlist::HttpAllowlistService),
/// reading directly from the durable store instead of an HTTP peer.
pub struct StoreBackedAllowlistService {
    store: PgAllowlistStore,
}

impl StoreBackedAllowlistService {
    pub fn new(store: PgAllowlistStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl AllowlistService for StoreBackedAllowlistService {
    async fn fetch_patterns(&self, scope: &str) -> anyhow::Result<Vec<Pattern>> {
        Ok(self.store.list_by_scope(scope).await?)
    }
}

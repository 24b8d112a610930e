//! The `ProcessedFile` entity (spec §3) and its durable repository,
//! backing the C4 processed-files cache's store tier.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::common::AppError;
use crate::kernel::cache::processed_files_cache::ProcessedFilesStore;

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct ProcessedFileRecord {
    pub scope: String,
    pub file_hash: String,
    pub storage_key: String,
    pub yara_results: Option<serde_json::Value>,
    pub processed_at: DateTime<Utc>,
}

pub struct PgProcessedFilesStore {
    pool: PgPool,
}

impl PgProcessedFilesStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find(&self, scope: &str, hash: &str) -> Result<Option<ProcessedFileRecord>, AppError> {
        let row = sqlx::query_as::<_, ProcessedFileRecord>(
            "SELECT * FROM processed_files WHERE scope = $1 AND file_hash = $2",
        )
        .bind(scope)
        .bind(hash.to_lowercase())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn record_yara(&self, scope: &str, hash: &str, results: serde_json::Value) -> Result<(), AppError> {
        sqlx::query("UPDATE processed_files SET yara_results = $3 WHERE scope = $1 AND file_hash = $2")
            .bind(scope)
            .bind(hash.to_lowercase())
            .bind(results)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ProcessedFilesStore for PgProcessedFilesStore {
    async fn is_processed(&self, scope: &str, hash: &str) -> Result<bool, AppError> {
        let found: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM processed_files WHERE scope = $1 AND file_hash = $2",
        )
        .bind(scope)
        .bind(hash.trim().to_lowercase())
        .fetch_optional(&self.pool)
        .await?;
        Ok(found.is_some())
    }

    async fn mark_processed(&self, scope: &str, hash: &str, storage_key: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO processed_files (scope, file_hash, storage_key, processed_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (scope, file_hash) DO NOTHING
            "#,
        )
        .bind(scope)
        .bind(hash.trim().to_lowercase())
        .bind(storage_key)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

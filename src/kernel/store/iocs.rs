//! The `Ioc` (indicator-of-compromise) entity (spec §3) and its durable
//! repository, backing the C4 IOC cache's store tier. Mutations bump the
//! [`VersionStamp`] so every cached host entry is invalidated atomically.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::common::{new_id, AppError};
use crate::kernel::cache::ioc_cache::{IocRecord, IocStore};
use crate::kernel::cache::version_stamp::VersionStamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, sqlx::Type)]
#[sqlx(type_name = "ioc_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum IocType {
    Fqdn,
    Ip,
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize, serde::Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct Ioc {
    #[builder(default = new_id())]
    pub id: Uuid,
    pub ioc_type: IocType,
    pub value: String,
    #[builder(default = true)]
    pub enabled: bool,
    #[builder(default, setter(strip_option))]
    pub description: Option<String>,
}

impl Ioc {
    /// Builds an `Ioc` with `value` canonicalized for `ioc_type` (FQDNs
    /// lowercased and trimmed, IPs trimmed only).
    pub fn new(ioc_type: IocType, value: impl Into<String>, enabled: bool, description: Option<String>) -> Self {
        let value = value.into();
        Self {
            id: new_id(),
            ioc_type,
            value: canonicalize(ioc_type, &value),
            enabled,
            description,
        }
    }
}

/// FQDNs are lowercased and trimmed; IPs are trimmed only (case is not
/// meaningful for IP literals).
fn canonicalize(ioc_type: IocType, value: &str) -> String {
    match ioc_type {
        IocType::Fqdn => value.trim().to_lowercase(),
        IocType::Ip => value.trim().to_string(),
    }
}

impl Ioc {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.value.trim().is_empty() {
            return Err(AppError::InvalidInput("ioc value must not be empty".into()));
        }
        Ok(())
    }
}

pub struct PgIocStore {
    pool: PgPool,
    version: Arc<VersionStamp>,
}

impl PgIocStore {
    pub fn new(pool: PgPool, version: Arc<VersionStamp>) -> Self {
        Self { pool, version }
    }

    pub async fn create(&self, ioc: &Ioc) -> Result<Ioc, AppError> {
        ioc.validate()?;
        let row = sqlx::query_as::<_, Ioc>(
            r#"
            INSERT INTO iocs (id, ioc_type, value, enabled, description)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(ioc.id)
        .bind(ioc.ioc_type)
        .bind(&ioc.value)
        .bind(ioc.enabled)
        .bind(&ioc.description)
        .fetch_one(&self.pool)
        .await?;
        self.version.bump().await;
        Ok(row)
    }

    pub async fn update(&self, ioc: &Ioc) -> Result<Ioc, AppError> {
        ioc.validate()?;
        let row = sqlx::query_as::<_, Ioc>(
            r#"
            UPDATE iocs SET value = $2, enabled = $3, description = $4
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(ioc.id)
        .bind(&ioc.value)
        .bind(ioc.enabled)
        .bind(&ioc.description)
        .fetch_one(&self.pool)
        .await?;
        self.version.bump().await;
        Ok(row)
    }

    pub async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM iocs WHERE id = $1").bind(id).execute(&self.pool).await?;
        let deleted = result.rows_affected() > 0;
        if deleted {
            self.version.bump().await;
        }
        Ok(deleted)
    }
}

#[async_trait]
impl IocStore for PgIocStore {
    async fn find_by_host(&self, host: &str) -> Result<Option<IocRecord>, AppError> {
        let host = host.trim().to_lowercase();
        let row: Option<(Uuid, IocType, String, Option<String>)> = sqlx::query_as(
            "SELECT id, ioc_type, value, description FROM iocs WHERE enabled AND value = $1 AND ioc_type = $2",
        )
        .bind(&host)
        .bind(IocType::Fqdn)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, ioc_type, value, description)| IocRecord {
            id,
            ioc_type: match ioc_type {
                IocType::Fqdn => "fqdn".to_string(),
                IocType::Ip => "ip".to_string(),
            },
            value,
            description,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fqdn_values_are_canonicalized_to_lowercase() {
        let ioc = Ioc::new(IocType::Fqdn, "  Bad.Example.COM  ", true, None);
        assert_eq!(ioc.value, "bad.example.com");
    }

    #[test]
    fn ip_values_are_trimmed_but_not_lowercased() {
        let ioc = Ioc::new(IocType::Ip, "  10.0.0.1  ", true, None);
        assert_eq!(ioc.value, "10.0.0.1");
    }

    #[test]
    fn rejects_empty_value() {
        let ioc = Ioc::new(IocType::Fqdn, "   ", true, None);
        assert!(ioc.validate().is_err());
    }
}

//! The `Site` entity (spec §3) and its durable repository.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::common::{new_id, AppError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "alert_mode", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AlertMode {
    #[default]
    Active,
    Muted,
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize, serde::Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct Site {
    #[builder(default = new_id())]
    pub id: Uuid,
    pub name: String,
    #[builder(default = true)]
    pub enabled: bool,
    #[builder(default)]
    pub alert_mode: AlertMode,
    #[builder(default, setter(strip_option))]
    pub scope: Option<String>,
    #[builder(default, setter(strip_option))]
    pub http_alert_sink_id: Option<Uuid>,
    #[builder(default = 15)]
    pub run_every_minutes: i32,
    pub source_id: Uuid,
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
}

impl Site {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.run_every_minutes <= 0 {
            return Err(AppError::InvalidInput("run_every_minutes must be > 0".into()));
        }
        Ok(())
    }

    pub fn task_name(&self) -> String {
        format!("site:{}", self.id)
    }
}

pub struct PgSiteStore {
    pool: PgPool,
}

impl PgSiteStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Site>, AppError> {
        let site = sqlx::query_as::<_, Site>("SELECT * FROM sites WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(site)
    }

    pub async fn insert(&self, site: &Site) -> Result<Site, AppError> {
        site.validate()?;
        let row = sqlx::query_as::<_, Site>(
            r#"
            INSERT INTO sites (
                id, name, enabled, alert_mode, scope, http_alert_sink_id,
                run_every_minutes, source_id, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            RETURNING *
            "#,
        )
        .bind(site.id)
        .bind(&site.name)
        .bind(site.enabled)
        .bind(site.alert_mode)
        .bind(&site.scope)
        .bind(site.http_alert_sink_id)
        .bind(site.run_every_minutes)
        .bind(site.source_id)
        .bind(site.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn update(&self, site: &Site) -> Result<Site, AppError> {
        site.validate()?;
        let row = sqlx::query_as::<_, Site>(
            r#"
            UPDATE sites
            SET name = $2, enabled = $3, alert_mode = $4, scope = $5,
                http_alert_sink_id = $6, run_every_minutes = $7, updated_at = $8
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(site.id)
        .bind(&site.name)
        .bind(site.enabled)
        .bind(site.alert_mode)
        .bind(&site.scope)
        .bind(site.http_alert_sink_id)
        .bind(site.run_every_minutes)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM sites WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_positive_run_every_minutes() {
        let site = Site::builder().name("Acme").source_id(Uuid::nil()).run_every_minutes(0).build();
        assert!(site.validate().is_err());
    }

    #[test]
    fn task_name_is_stable_per_site() {
        let site = Site::builder().name("Acme").source_id(Uuid::nil()).build();
        assert_eq!(site.task_name(), format!("site:{}", site.id));
    }
}

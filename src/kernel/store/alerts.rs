//! The `Alert` entity (spec §3) and its durable repository, backing the
//! `AlertStore` collaborator consumed by the rule evaluators.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::common::{new_id, AppError};
use crate::kernel::rules::evaluators::{AlertSeverity, AlertStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "delivery_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    #[default]
    Pending,
    Muted,
    Dispatched,
    Failed,
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize, serde::Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct Alert {
    #[builder(default = new_id())]
    pub id: Uuid,
    #[builder(default, setter(strip_option))]
    pub site_id: Option<Uuid>,
    #[builder(default, setter(strip_option))]
    pub rule_id: Option<Uuid>,
    pub rule_type: String,
    pub severity: AlertSeverity,
    pub title: String,
    pub description: String,
    pub event_context: serde_json::Value,
    #[builder(default)]
    pub delivery_status: DeliveryStatus,
    #[builder(default = Utc::now())]
    pub fired_at: DateTime<Utc>,
    #[builder(default, setter(strip_option))]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Alert {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.title.len() > 255 {
            return Err(AppError::InvalidInput("title must be at most 255 characters".into()));
        }
        if self.rule_type.trim().is_empty() {
            return Err(AppError::InvalidInput("rule_type must not be empty".into()));
        }
        Ok(())
    }
}

pub struct PgAlertStore {
    pool: PgPool,
}

impl PgAlertStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Alert>, AppError> {
        let alert = sqlx::query_as::<_, Alert>("SELECT * FROM alerts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(alert)
    }

    pub async fn mark_delivery(&self, id: Uuid, status: DeliveryStatus) -> Result<bool, AppError> {
        let result = sqlx::query("UPDATE alerts SET delivery_status = $2 WHERE id = $1")
            .bind(id)
            .bind(status)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn resolve(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("UPDATE alerts SET resolved_at = $2 WHERE id = $1 AND resolved_at IS NULL")
            .bind(id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl AlertStore for PgAlertStore {
    async fn create_alert(
        &self,
        alert_type: &str,
        severity: AlertSeverity,
        scope: &str,
        site_id: Option<Uuid>,
        event_context: serde_json::Value,
    ) -> Result<Uuid, AppError> {
        let alert = Alert::builder()
            .site_id(site_id)
            .rule_type(alert_type)
            .severity(severity)
            .title(format!("{alert_type} in {scope}"))
            .description(format!("rule `{alert_type}` fired for scope `{scope}`"))
            .event_context(event_context)
            .build();
        alert.validate()?;

        let row = sqlx::query_as::<_, Alert>(
            r#"
            INSERT INTO alerts (
                id, site_id, rule_id, rule_type, severity, title, description,
                event_context, delivery_status, fired_at, resolved_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(alert.id)
        .bind(alert.site_id)
        .bind(alert.rule_id)
        .bind(&alert.rule_type)
        .bind(alert.severity)
        .bind(&alert.title)
        .bind(&alert.description)
        .bind(&alert.event_context)
        .bind(alert.delivery_status)
        .bind(alert.fired_at)
        .bind(alert.resolved_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.id)
    }
}

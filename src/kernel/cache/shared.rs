//! C2: shared cache adapter — the cross-process coordination tier.
//!
//! Grounded in `harborgrid-justin-caddy`'s `redis = { version = "0.24",
//! features = ["tokio-comp", "connection-manager"] }` dependency (this
//! crate's own teacher only carries a `Config.redis_url` field and a
//! `testcontainers-modules` redis feature, not a client), using
//! `ConnectionManager` for transparent reconnects the way a long-lived
//! shared-tier client needs to behave.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::common::AppError;

/// The C2 contract. `ttl = None` (or a zero `Duration`) means "no TTL".
#[async_trait]
pub trait SharedCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError>;

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), AppError>;

    async fn delete(&self, key: &str) -> Result<bool, AppError>;

    async fn exists(&self, key: &str) -> Result<bool, AppError>;

    async fn set_ttl(&self, key: &str, ttl: Duration) -> Result<bool, AppError>;

    /// Atomic "first writer wins" primitive — the cross-process
    /// coordination primitive the alert-once cache (C7) relies on.
    /// Returns whether this call was the one that set the value.
    async fn set_if_not_exists(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, AppError>;

    async fn health(&self) -> Result<(), AppError>;
}

/// Redis-backed implementation of [`SharedCache`].
#[derive(Clone)]
pub struct RedisSharedCache {
    manager: ConnectionManager,
}

impl RedisSharedCache {
    pub async fn connect(redis_url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let manager = client.get_connection_manager().await?;
        Ok(Self { manager })
    }
}

#[async_trait]
impl SharedCache for RedisSharedCache {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let mut conn = self.manager.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), AppError> {
        let mut conn = self.manager.clone();
        match ttl.filter(|d| !d.is_zero()) {
            Some(ttl) => {
                let _: () = conn.set_ex(key, value, ttl.as_secs().max(1)).await?;
            }
            None => {
                let _: () = conn.set(key, value).await?;
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, AppError> {
        let mut conn = self.manager.clone();
        let removed: i64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool, AppError> {
        let mut conn = self.manager.clone();
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }

    async fn set_ttl(&self, key: &str, ttl: Duration) -> Result<bool, AppError> {
        let mut conn = self.manager.clone();
        let applied: bool = conn.expire(key, ttl.as_secs().max(1) as i64).await?;
        Ok(applied)
    }

    async fn set_if_not_exists(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, AppError> {
        let mut conn = self.manager.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("NX");
        if let Some(ttl) = ttl.filter(|d| !d.is_zero()) {
            cmd.arg("PX").arg(ttl.as_millis().max(1) as i64);
        }
        let result: Option<String> = cmd.query_async(&mut conn).await?;
        Ok(result.is_some())
    }

    async fn health(&self) -> Result<(), AppError> {
        let mut conn = self.manager.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

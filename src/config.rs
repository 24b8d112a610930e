//! Application configuration loaded from environment variables.

use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

/// Control-plane (`sitewatch-server`) configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub database_url: String,
    pub redis_url: String,
    pub bind_addr: String,
    pub port: u16,
    /// Base URL of the external allow-list service consulted by C6.
    pub allowlist_service_url: String,
    /// Fetch timeout for the allow-list service (§4.6 default 10s).
    pub allowlist_fetch_timeout: Duration,
    /// Default lease duration handed out by `ReserveNext` when the
    /// caller doesn't specify one.
    pub default_lease_seconds: u64,
    /// Interval at which the lease reaper sweeps expired leases.
    pub lease_reap_interval: Duration,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            allowlist_service_url: env::var("ALLOWLIST_SERVICE_URL")
                .unwrap_or_else(|_| "http://localhost:8081".to_string()),
            allowlist_fetch_timeout: Duration::from_millis(
                env::var("ALLOWLIST_FETCH_TIMEOUT_MS")
                    .unwrap_or_else(|_| "10000".to_string())
                    .parse()
                    .context("ALLOWLIST_FETCH_TIMEOUT_MS must be a valid number")?,
            ),
            default_lease_seconds: env::var("DEFAULT_LEASE_SECONDS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .context("DEFAULT_LEASE_SECONDS must be a valid number")?,
            lease_reap_interval: Duration::from_secs(
                env::var("LEASE_REAP_INTERVAL_SECONDS")
                    .unwrap_or_else(|_| "15".to_string())
                    .parse()
                    .context("LEASE_REAP_INTERVAL_SECONDS must be a valid number")?,
            ),
        })
    }
}

/// Worker tunables from spec.md §6 ("Worker tunables").
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub api_base_url: String,
    pub job_type: String,
    pub lease_seconds: u64,
    pub wait_seconds: u64,
    pub heartbeat_seconds: u64,
    pub batch_size: usize,
    pub max_batch_age_ms: u64,
    pub shipping_endpoint: Option<String>,
    pub worker_id: String,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self> {
        let _ = dotenv();

        let job_type = env::var("JOB_TYPE").unwrap_or_else(|_| "browser".to_string());
        if job_type != "browser" && job_type != "rules" {
            anyhow::bail!("JOB_TYPE must be 'browser' or 'rules', got '{job_type}'");
        }

        Ok(Self {
            api_base_url: env::var("API_BASE_URL")
                .context("API_BASE_URL must be set")?,
            job_type,
            lease_seconds: env::var("LEASE_SECONDS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .context("LEASE_SECONDS must be a valid number")?,
            wait_seconds: env::var("WAIT_SECONDS")
                .unwrap_or_else(|_| "25".to_string())
                .parse()
                .context("WAIT_SECONDS must be a valid number")?,
            heartbeat_seconds: env::var("HEARTBEAT_SECONDS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .context("HEARTBEAT_SECONDS must be a valid number")?,
            batch_size: env::var("TELEMETRY_BATCH_SIZE")
                .unwrap_or_else(|_| "50".to_string())
                .parse()
                .context("TELEMETRY_BATCH_SIZE must be a valid number")?,
            max_batch_age_ms: env::var("TELEMETRY_MAX_BATCH_AGE_MS")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .context("TELEMETRY_MAX_BATCH_AGE_MS must be a valid number")?,
            shipping_endpoint: env::var("TELEMETRY_SHIPPING_ENDPOINT").ok(),
            worker_id: env::var("WORKER_ID")
                .unwrap_or_else(|_| format!("worker-{}", uuid::Uuid::new_v4())),
        })
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn job_type_validation_accepts_only_browser_or_rules() {
        let valid = |t: &str| t == "browser" || t == "rules";
        assert!(valid("browser"));
        assert!(valid("rules"));
        assert!(!valid("bogus"));
    }
}

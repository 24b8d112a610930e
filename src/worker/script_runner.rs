//! The external collaborator that actually executes a job's script
//! (browser automation, rule evaluation, etc). This crate only defines
//! the seam; a concrete implementation lives outside the core per spec.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct ScriptOutcome {
    pub success: bool,
    pub error: Option<String>,
}

impl ScriptOutcome {
    pub fn success() -> Self {
        Self { success: true, error: None }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

#[async_trait]
pub trait ScriptRunner: Send + Sync {
    /// Run `script` (or navigate to a URL, depending on payload shape),
    /// aborting promptly when `cancel` fires.
    async fn run(&self, script: &str, cancel: CancellationToken) -> anyhow::Result<ScriptOutcome>;
}

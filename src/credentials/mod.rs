use crate::error::{PipelineError, PipelineResult};
use crate::storage::{self, ProviderSelector};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{error, info};

/// Owns the cookie artifact used for gated extraction.
///
/// The file lives at a fixed local path for the lifetime of the process. It is
/// fetched from remote storage at most once; concurrent first-time callers
/// wait on the same fetch.
pub struct CredentialResolver {
    cookie_path: PathBuf,
    remote_location: Option<String>,
    selector: Arc<dyn ProviderSelector>,
    resolved: OnceCell<PathBuf>,
}

impl CredentialResolver {
    pub fn new(
        cookie_path: impl Into<PathBuf>,
        remote_location: Option<String>,
        selector: Arc<dyn ProviderSelector>,
    ) -> Self {
        Self {
            cookie_path: cookie_path.into(),
            remote_location,
            selector,
            resolved: OnceCell::new(),
        }
    }

    pub async fn get_cookie_file(&self, job_id: &str) -> PipelineResult<PathBuf> {
        let result = self
            .resolved
            .get_or_try_init(|| self.resolve())
            .await
            .cloned();

        if let Err(e) = &result {
            error!(
                "Job {}: Error when collecting cookie file for download - {}",
                job_id, e
            );
        }

        result
    }

    async fn resolve(&self) -> PipelineResult<PathBuf> {
        if tokio::fs::try_exists(&self.cookie_path).await? {
            return Ok(self.cookie_path.clone());
        }

        let remote = self.remote_location.as_deref().ok_or_else(|| {
            PipelineError::Configuration("COOKIE_FILE environment variable not set".to_string())
        })?;

        info!("Fetching cookie file from {}", remote);
        let provider = self.selector.select()?;
        storage::download_file(provider.as_ref(), remote, &self.cookie_path).await
    }
}

//! Cloud object storage backends.
//!
//! Exactly one provider is selected per call from environment configuration:
//! GCP when its variables are present, otherwise an S3-compatible endpoint.
//! The two are not symmetric: only the S3-compatible provider can fetch
//! objects back down to local disk.

mod gcp;
mod s3;

pub use gcp::{GcpConfig, GcpStorageProvider};
pub use s3::{S3CompatibleProvider, S3Config};

use crate::error::{PipelineError, PipelineResult};
use async_trait::async_trait;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, ObjectStoreExt, WriteMultipart};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, error, info, warn};

const UPLOAD_CHUNK_SIZE: usize = 5 * 1024 * 1024;
const UPLOAD_CONCURRENCY: usize = 4;

#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Short backend identifier used in logs
    fn name(&self) -> &'static str;

    /// Upload a local file and return its publicly reachable URL
    async fn upload_file(&self, file_path: &Path) -> PipelineResult<String>;

    /// Fetch a remote object into a provider-chosen local path and return that path.
    /// Callers move the file to wherever they actually need it.
    async fn download_file(&self, remote: &str) -> PipelineResult<PathBuf>;
}

/// Source of storage providers, consulted once per operation.
pub trait ProviderSelector: Send + Sync {
    fn select(&self) -> PipelineResult<Arc<dyn StorageProvider>>;
}

/// Selects a provider from the process environment on every call.
pub struct EnvProviderSelector {
    staging_dir: PathBuf,
}

impl EnvProviderSelector {
    pub fn new(staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            staging_dir: staging_dir.into(),
        }
    }
}

impl ProviderSelector for EnvProviderSelector {
    fn select(&self) -> PipelineResult<Arc<dyn StorageProvider>> {
        get_storage_provider(|key| std::env::var(key).ok(), &self.staging_dir)
    }
}

pub fn get_storage_provider<F>(
    lookup: F,
    staging_dir: &Path,
) -> PipelineResult<Arc<dyn StorageProvider>>
where
    F: Fn(&str) -> Option<String>,
{
    match GcpConfig::from_lookup(&lookup) {
        Ok(config) => return Ok(Arc::new(GcpStorageProvider::new(config)?)),
        Err(missing) => debug!("GCP storage not configured, missing: {}", missing.join(", ")),
    }

    let config = S3Config::from_lookup(&lookup).map_err(|missing| {
        PipelineError::Configuration(format!(
            "No cloud storage configured. Missing environment variables: {}",
            missing.join(", ")
        ))
    })?;

    Ok(Arc::new(S3CompatibleProvider::new(config, staging_dir)?))
}

/// Reads every variable in `names`, treating empty values as absent.
/// On failure returns the names that were missing.
fn read_vars<F>(lookup: &F, names: &[&'static str]) -> Result<Vec<String>, Vec<&'static str>>
where
    F: Fn(&str) -> Option<String>,
{
    let mut values = Vec::with_capacity(names.len());
    let mut missing = Vec::new();

    for name in names {
        match lookup(name).filter(|v| !v.trim().is_empty()) {
            Some(value) => values.push(value),
            None => missing.push(*name),
        }
    }

    if missing.is_empty() {
        Ok(values)
    } else {
        Err(missing)
    }
}

fn object_name(file_path: &Path) -> PipelineResult<String> {
    file_path
        .file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.to_string())
        .ok_or_else(|| {
            PipelineError::Upload(format!(
                "Cannot derive object name from {}",
                file_path.display()
            ))
        })
}

/// Streams a local file into `store` as a multipart upload.
/// Returns the number of bytes written. A failed upload is aborted.
async fn put_file<S: ObjectStore>(
    store: &S,
    key: &ObjectPath,
    file_path: &Path,
) -> PipelineResult<u64> {
    let mut file = tokio::fs::File::open(file_path).await?;
    let upload = store
        .put_multipart(key)
        .await
        .map_err(|e| PipelineError::Upload(e.to_string()))?;
    let mut writer = WriteMultipart::new(upload);

    match copy_chunks(&mut file, &mut writer).await {
        Ok(size) => {
            writer
                .finish()
                .await
                .map_err(|e| PipelineError::Upload(e.to_string()))?;
            Ok(size)
        }
        Err(e) => {
            if let Err(abort) = writer.abort().await {
                warn!("Failed to abort multipart upload of {}: {}", key, abort);
            }
            Err(e)
        }
    }
}

async fn copy_chunks<R>(reader: &mut R, writer: &mut WriteMultipart) -> PipelineResult<u64>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; UPLOAD_CHUNK_SIZE];
    let mut size = 0u64;

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(size);
        }

        writer
            .wait_for_capacity(UPLOAD_CONCURRENCY)
            .await
            .map_err(|e| PipelineError::Upload(e.to_string()))?;
        writer.write(&buf[..n]);
        size += n as u64;
    }
}

pub async fn upload_file(
    provider: &dyn StorageProvider,
    file_path: &Path,
) -> PipelineResult<String> {
    info!(
        "Uploading file to cloud storage ({}): {}",
        provider.name(),
        file_path.display()
    );

    match provider.upload_file(file_path).await {
        Ok(url) => {
            info!("File uploaded successfully: {}", url);
            Ok(url)
        }
        Err(e) => {
            error!("Error uploading file to cloud storage: {}", e);
            Err(e)
        }
    }
}

/// Fetches `remote` through `provider` and moves the result to `target_path`.
pub async fn download_file(
    provider: &dyn StorageProvider,
    remote: &str,
    target_path: &Path,
) -> PipelineResult<PathBuf> {
    info!(
        "Downloading file from cloud storage ({}): {}",
        provider.name(),
        remote
    );

    let result = async {
        let staged = provider.download_file(remote).await?;
        move_file(&staged, target_path).await?;
        Ok(target_path.to_path_buf())
    }
    .await;

    match result {
        Ok(path) => {
            info!("File downloaded successfully: {}", path.display());
            Ok(path)
        }
        Err(e) => {
            error!("Error downloading file from cloud storage: {}", e);
            Err(e)
        }
    }
}

async fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if from == to {
        return Ok(());
    }

    if let Some(parent) = to.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    // rename fails across filesystems
    if tokio::fs::rename(from, to).await.is_err() {
        tokio::fs::copy(from, to).await?;
        tokio::fs::remove_file(from).await?;
    }

    Ok(())
}

use super::{object_name, put_file, read_vars, StorageProvider};
use crate::error::{PipelineError, PipelineResult};
use async_trait::async_trait;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct GcpConfig {
    pub bucket_name: String,
    /// Service account key, either inline JSON or a path to the JSON file.
    pub credentials: String,
}

impl GcpConfig {
    pub(super) fn from_lookup<F>(lookup: &F) -> Result<Self, Vec<&'static str>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut values = read_vars(lookup, &["GCP_BUCKET_NAME", "GCP_SA_CREDENTIALS"])?.into_iter();

        Ok(Self {
            bucket_name: values.next().unwrap_or_default(),
            credentials: values.next().unwrap_or_default(),
        })
    }
}

pub struct GcpStorageProvider {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl GcpStorageProvider {
    pub fn new(config: GcpConfig) -> PipelineResult<Self> {
        let builder = GoogleCloudStorageBuilder::new().with_bucket_name(config.bucket_name.clone());

        let builder = if config.credentials.trim_start().starts_with('{') {
            builder.with_service_account_key(config.credentials)
        } else {
            builder.with_service_account_path(config.credentials)
        };

        let store = builder.build().map_err(|e| {
            PipelineError::Configuration(format!("Invalid GCP storage configuration: {}", e))
        })?;

        Ok(Self::with_store(Arc::new(store), config.bucket_name))
    }

    pub fn with_store(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }

    fn generate_url(&self, key: &str) -> String {
        format!("https://storage.googleapis.com/{}/{}", self.bucket, key)
    }
}

#[async_trait]
impl StorageProvider for GcpStorageProvider {
    fn name(&self) -> &'static str {
        "gcp"
    }

    async fn upload_file(&self, file_path: &Path) -> PipelineResult<String> {
        let key = object_name(file_path)?;
        let size = put_file(&self.store, &ObjectPath::from(key.as_str()), file_path)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, bucket = %self.bucket, key = %key, "GCS upload failed");
                e
            })?;

        tracing::info!(bucket = %self.bucket, key = %key, size_bytes = size, "GCS upload successful");

        Ok(self.generate_url(&key))
    }

    async fn download_file(&self, _remote: &str) -> PipelineResult<PathBuf> {
        Err(PipelineError::UnsupportedOperation(
            "download_file not implemented for GCP".to_string(),
        ))
    }
}

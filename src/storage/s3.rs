use super::{object_name, put_file, read_vars, StorageProvider};
use crate::error::{PipelineError, PipelineResult};
use async_trait::async_trait;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::{Error as ObjectStoreError, ObjectStore, ObjectStoreExt};
use percent_encoding::percent_decode_str;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::{Host, Url};

const DEFAULT_REGION: &str = "us-east-1";

#[derive(Debug, Clone)]
pub struct S3Config {
    pub endpoint_url: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: Option<String>,
    pub region: Option<String>,
}

impl S3Config {
    pub(super) fn from_lookup<F>(lookup: &F) -> Result<Self, Vec<&'static str>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut values =
            read_vars(lookup, &["S3_ENDPOINT_URL", "S3_ACCESS_KEY", "S3_SECRET_KEY"])?.into_iter();
        let optional = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        Ok(Self {
            endpoint_url: values.next().unwrap_or_default(),
            access_key: values.next().unwrap_or_default(),
            secret_key: values.next().unwrap_or_default(),
            bucket: optional("S3_BUCKET_NAME"),
            region: optional("S3_REGION"),
        })
    }

    /// Returns `(endpoint, bucket)`.
    ///
    /// Without an explicit bucket the endpoint is read as virtual-hosted:
    /// `https://media.nyc3.example.com` means bucket `media` on `https://nyc3.example.com`.
    pub fn resolve_bucket(&self) -> PipelineResult<(String, String)> {
        let endpoint = self.endpoint_url.trim_end_matches('/');

        if let Some(bucket) = &self.bucket {
            return Ok((endpoint.to_string(), bucket.clone()));
        }

        let url = Url::parse(endpoint).map_err(|e| {
            PipelineError::Configuration(format!("Invalid S3_ENDPOINT_URL '{}': {}", endpoint, e))
        })?;

        let derived = match url.host() {
            Some(Host::Domain(host)) => host
                .split_once('.')
                .filter(|(bucket, rest)| !bucket.is_empty() && rest.contains('.')),
            _ => None,
        };

        let (bucket, host) = derived.ok_or_else(|| {
            PipelineError::Configuration(format!(
                "Cannot derive bucket name from S3_ENDPOINT_URL '{}'; set S3_BUCKET_NAME",
                endpoint
            ))
        })?;

        let port = url.port().map(|p| format!(":{}", p)).unwrap_or_default();
        Ok((format!("{}://{}{}", url.scheme(), host, port), bucket.to_string()))
    }
}

/// S3-compatible storage (AWS, MinIO, DigitalOcean Spaces, R2, ...)
pub struct S3CompatibleProvider {
    store: Arc<dyn ObjectStore>,
    endpoint: String,
    bucket: String,
    staging_dir: PathBuf,
}

impl S3CompatibleProvider {
    pub fn new(config: S3Config, staging_dir: &Path) -> PipelineResult<Self> {
        let (endpoint, bucket) = config.resolve_bucket()?;

        let store = AmazonS3Builder::new()
            .with_endpoint(endpoint.clone())
            .with_allow_http(endpoint.starts_with("http://"))
            .with_bucket_name(bucket.clone())
            .with_access_key_id(config.access_key)
            .with_secret_access_key(config.secret_key)
            .with_region(config.region.unwrap_or_else(|| DEFAULT_REGION.to_string()))
            .build()
            .map_err(|e| {
                PipelineError::Configuration(format!("Invalid S3 configuration: {}", e))
            })?;

        Ok(Self::with_store(Arc::new(store), endpoint, bucket, staging_dir))
    }

    pub fn with_store(
        store: Arc<dyn ObjectStore>,
        endpoint: impl Into<String>,
        bucket: impl Into<String>,
        staging_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            endpoint: endpoint.into(),
            bucket: bucket.into(),
            staging_dir: staging_dir.into(),
        }
    }

    fn generate_url(&self, key: &str) -> String {
        format!(
            "{}/{}/{}",
            self.endpoint.trim_end_matches('/'),
            self.bucket,
            key
        )
    }

    /// Accepts a bare key, an `s3://bucket/key` URL, or an HTTP(S) object URL
    /// in either path or virtual-hosted style. URL paths are percent-decoded
    /// segment by segment. Locations naming another bucket are rejected.
    fn object_key(&self, remote: &str) -> PipelineResult<ObjectPath> {
        let url = match Url::parse(remote) {
            Ok(url) if url.has_host() => url,
            _ => return Ok(ObjectPath::from(remote.trim_start_matches('/'))),
        };

        let host = url.host_str().unwrap_or_default();
        let mut segments: Vec<&str> = url
            .path_segments()
            .map(|segments| segments.collect())
            .unwrap_or_default();

        let in_bucket = if url.scheme() == "s3" {
            host == self.bucket
        } else if host.split_once('.').map(|(label, _)| label) == Some(self.bucket.as_str()) {
            true
        } else if segments.first() == Some(&self.bucket.as_str()) {
            segments.remove(0);
            true
        } else {
            false
        };

        if !in_bucket {
            return Err(PipelineError::Download(format!(
                "Object location '{}' is outside bucket '{}'",
                remote, self.bucket
            )));
        }

        let parts = segments
            .into_iter()
            .filter(|segment| !segment.is_empty())
            .map(|segment| {
                percent_decode_str(segment)
                    .decode_utf8()
                    .map(|decoded| decoded.into_owned())
                    .map_err(|e| {
                        PipelineError::Download(format!(
                            "Invalid object location '{}': {}",
                            remote, e
                        ))
                    })
            })
            .collect::<PipelineResult<Vec<String>>>()?;

        Ok(ObjectPath::from_iter(parts))
    }
}

#[async_trait]
impl StorageProvider for S3CompatibleProvider {
    fn name(&self) -> &'static str {
        "s3"
    }

    async fn upload_file(&self, file_path: &Path) -> PipelineResult<String> {
        let key = object_name(file_path)?;
        let start = std::time::Instant::now();

        let size = put_file(&self.store, &ObjectPath::from(key.as_str()), file_path)
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 upload failed"
                );
                e
            })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 upload successful"
        );

        Ok(self.generate_url(&key))
    }

    async fn download_file(&self, remote: &str) -> PipelineResult<PathBuf> {
        let key = self.object_key(remote)?;
        let file_name = key
            .filename()
            .ok_or_else(|| PipelineError::Download(format!("Invalid object location: {}", remote)))?
            .to_string();
        let start = std::time::Instant::now();

        let result = self
            .store
            .get(&key)
            .await
            .map_err(|e| match e {
                ObjectStoreError::NotFound { .. } => {
                    PipelineError::Download(format!("Object not found: {}", key))
                }
                other => {
                    tracing::error!(
                        error = %other,
                        bucket = %self.bucket,
                        key = %key,
                        duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                        "S3 download failed"
                    );
                    PipelineError::Download(other.to_string())
                }
            })?;

        let bytes = result
            .bytes()
            .await
            .map_err(|e| PipelineError::Download(e.to_string()))?;

        tokio::fs::create_dir_all(&self.staging_dir).await?;
        let local_path = self.staging_dir.join(file_name);
        tokio::fs::write(&local_path, &bytes).await?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = bytes.len() as u64,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 download successful"
        );

        Ok(local_path)
    }
}

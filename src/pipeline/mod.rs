//! Download-then-persist pipeline for a single job.

use crate::config::ResponseContract;
use crate::credentials::CredentialResolver;
use crate::error::{ErrorKind, PipelineError, PipelineResult};
use crate::media::Extractor;
use crate::storage::{self, ProviderSelector};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use url::Url;

pub const DOWNLOAD_ROUTE: &str = "/v1/video/download";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobRequest {
    pub video_url: Url,
    #[serde(default)]
    pub webhook_url: Option<Url>,
    #[serde(default, rename = "id")]
    pub client_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaResponse {
    pub cloud_url: String,
    pub height: Option<u32>,
    pub width: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SuccessBody {
    CloudUrl(String),
    Media(MediaResponse),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Success(SuccessBody),
    Failure { kind: ErrorKind, message: String },
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Success(_))
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            JobOutcome::Success(_) => None,
            JobOutcome::Failure { kind, .. } => Some(*kind),
        }
    }

    /// `(body, route, status)` as handed to the HTTP layer.
    pub fn into_response(self) -> (serde_json::Value, &'static str, StatusCode) {
        match self {
            JobOutcome::Success(body) => (
                serde_json::to_value(body).unwrap_or(serde_json::Value::Null),
                DOWNLOAD_ROUTE,
                StatusCode::OK,
            ),
            JobOutcome::Failure { message, .. } => (
                serde_json::Value::String(message),
                DOWNLOAD_ROUTE,
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        }
    }
}

impl From<PipelineError> for JobOutcome {
    fn from(err: PipelineError) -> Self {
        JobOutcome::Failure {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

pub struct DownloadOrchestrator {
    extractor: Arc<dyn Extractor>,
    selector: Arc<dyn ProviderSelector>,
    credentials: Arc<CredentialResolver>,
    contract: ResponseContract,
}

impl DownloadOrchestrator {
    pub fn new(
        extractor: Arc<dyn Extractor>,
        selector: Arc<dyn ProviderSelector>,
        credentials: Arc<CredentialResolver>,
        contract: ResponseContract,
    ) -> Self {
        Self {
            extractor,
            selector,
            credentials,
            contract,
        }
    }

    pub async fn run(&self, job_id: &str, request: &JobRequest) -> JobOutcome {
        info!(
            "Job {}: Received download request for '{}' (id: {})",
            job_id,
            request.video_url,
            request.client_id.as_deref().unwrap_or("-")
        );

        match self.execute(job_id, request).await {
            Ok(body) => JobOutcome::Success(body),
            Err(e) => {
                error!("Job {}: Error during video download process - {}", job_id, e);
                e.into()
            }
        }
    }

    async fn execute(&self, job_id: &str, request: &JobRequest) -> PipelineResult<SuccessBody> {
        // The cookie is resolved for every job in the metadata flow, whether or
        // not the source is gated.
        let cookie_file = match self.contract {
            ResponseContract::Metadata => Some(self.credentials.get_cookie_file(job_id).await?),
            ResponseContract::Url => None,
        };

        let download = self
            .extractor
            .download(request.video_url.as_str(), cookie_file.as_deref(), job_id)
            .await?;
        info!(
            "Job {}: Video download process completed successfully with {}",
            job_id,
            self.extractor.name()
        );

        // On upload failure the extracted file is left on disk.
        let provider = self.selector.select()?;
        let cloud_url =
            storage::upload_file(provider.as_ref(), &download.output_filename).await?;
        info!(
            "Job {}: Downloaded video uploaded to cloud storage: {}",
            job_id, cloud_url
        );

        tokio::fs::remove_file(&download.output_filename).await?;

        Ok(match self.contract {
            ResponseContract::Metadata => SuccessBody::Media(MediaResponse {
                cloud_url,
                height: download.height,
                width: download.width,
            }),
            ResponseContract::Url => SuccessBody::CloudUrl(cloud_url),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::media::DownloadResult;
    use crate::storage::StorageProvider;
    use async_trait::async_trait;
    use serde_json::json;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Writes a file into its directory and reports fixed dimensions.
    pub(crate) struct FakeExtractor {
        pub output: PathBuf,
        pub produce_file: bool,
        pub cookies_seen: Mutex<Vec<Option<PathBuf>>>,
    }

    impl FakeExtractor {
        pub(crate) fn new(output: PathBuf) -> Self {
            Self {
                output,
                produce_file: true,
                cookies_seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Extractor for FakeExtractor {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn download(
            &self,
            _url: &str,
            cookie_file: Option<&Path>,
            _job_id: &str,
        ) -> PipelineResult<DownloadResult> {
            self.cookies_seen
                .lock()
                .unwrap()
                .push(cookie_file.map(Path::to_path_buf));

            if !self.produce_file {
                return Err(PipelineError::MissingOutput(self.output.clone()));
            }

            tokio::fs::write(&self.output, b"video").await?;
            Ok(DownloadResult {
                output_filename: self.output.clone(),
                height: Some(720),
                width: Some(1280),
            })
        }
    }

    pub(crate) struct FakeProvider {
        pub fail_upload: bool,
        pub uploads: AtomicUsize,
        pub downloads: AtomicUsize,
    }

    impl FakeProvider {
        pub(crate) fn new(fail_upload: bool) -> Self {
            Self {
                fail_upload,
                uploads: AtomicUsize::new(0),
                downloads: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl StorageProvider for FakeProvider {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn upload_file(&self, file_path: &Path) -> PipelineResult<String> {
            self.uploads.fetch_add(1, Ordering::SeqCst);
            if self.fail_upload {
                return Err(PipelineError::Upload("bucket rejected the object".to_string()));
            }
            let name = file_path.file_name().unwrap().to_string_lossy();
            Ok(format!("https://s3.example.com/media/{}", name))
        }

        async fn download_file(&self, _remote: &str) -> PipelineResult<PathBuf> {
            self.downloads.fetch_add(1, Ordering::SeqCst);
            Err(PipelineError::Download("not used".to_string()))
        }
    }

    pub(crate) struct FakeSelector(pub Arc<FakeProvider>);

    impl ProviderSelector for FakeSelector {
        fn select(&self) -> PipelineResult<Arc<dyn StorageProvider>> {
            Ok(self.0.clone())
        }
    }

    pub(crate) struct Fixture {
        pub dir: TempDir,
        pub extractor: Arc<FakeExtractor>,
        pub provider: Arc<FakeProvider>,
        pub output: PathBuf,
        pub cookie_path: PathBuf,
    }

    impl Fixture {
        pub(crate) fn new(fail_upload: bool) -> Self {
            let dir = TempDir::new().unwrap();
            let output = dir.path().join("abc.mp4");
            let cookie_path = dir.path().join("cookiefile.txt");
            std::fs::write(&cookie_path, b"# Netscape HTTP Cookie File\n").unwrap();

            Self {
                extractor: Arc::new(FakeExtractor::new(output.clone())),
                provider: Arc::new(FakeProvider::new(fail_upload)),
                output,
                cookie_path,
                dir,
            }
        }

        pub(crate) fn orchestrator(&self, contract: ResponseContract) -> DownloadOrchestrator {
            let selector: Arc<dyn ProviderSelector> =
                Arc::new(FakeSelector(self.provider.clone()));
            let credentials = Arc::new(CredentialResolver::new(
                &self.cookie_path,
                None,
                selector.clone(),
            ));
            DownloadOrchestrator::new(self.extractor.clone(), selector, credentials, contract)
        }
    }

    fn request() -> JobRequest {
        serde_json::from_value(json!({"video_url": "https://example.com/watch?v=abc"})).unwrap()
    }

    #[tokio::test]
    async fn test_successful_job() {
        let fx = Fixture::new(false);
        let orchestrator = fx.orchestrator(ResponseContract::Metadata);

        let outcome = orchestrator.run("job-1", &request()).await;
        let (body, route, status) = outcome.into_response();

        assert_eq!(
            body,
            json!({
                "cloud_url": "https://s3.example.com/media/abc.mp4",
                "height": 720,
                "width": 1280
            })
        );
        assert_eq!(route, "/v1/video/download");
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fx.provider.uploads.load(Ordering::SeqCst), 1);
        assert!(!fx.output.exists());
        assert_eq!(
            *fx.extractor.cookies_seen.lock().unwrap(),
            vec![Some(fx.cookie_path.clone())]
        );
    }

    #[tokio::test]
    async fn test_url_contract_returns_bare_url_without_cookie() {
        let fx = Fixture::new(false);
        std::fs::remove_file(&fx.cookie_path).unwrap();
        let orchestrator = fx.orchestrator(ResponseContract::Url);

        let (body, _, status) = orchestrator.run("job-1", &request()).await.into_response();

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!("https://s3.example.com/media/abc.mp4"));
        assert_eq!(*fx.extractor.cookies_seen.lock().unwrap(), vec![None]);
        assert!(!fx.output.exists());
    }

    #[tokio::test]
    async fn test_upload_failure_leaves_local_file() {
        let fx = Fixture::new(true);
        let orchestrator = fx.orchestrator(ResponseContract::Metadata);

        let outcome = orchestrator.run("job-1", &request()).await;
        assert_eq!(
            outcome,
            JobOutcome::Failure {
                kind: ErrorKind::Upload,
                message: "Upload failed: bucket rejected the object".to_string(),
            }
        );

        let (body, route, status) = outcome.into_response();
        assert_eq!(body, json!("Upload failed: bucket rejected the object"));
        assert_eq!(route, "/v1/video/download");
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(fx.output.exists());
    }

    #[tokio::test]
    async fn test_missing_output_skips_upload() {
        let mut fx = Fixture::new(false);
        let mut extractor = FakeExtractor::new(fx.output.clone());
        extractor.produce_file = false;
        fx.extractor = Arc::new(extractor);
        let orchestrator = fx.orchestrator(ResponseContract::Metadata);

        let outcome = orchestrator.run("job-1", &request()).await;

        assert!(!outcome.is_success());
        let (_, _, status) = outcome.into_response();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(fx.provider.uploads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cookie_failure_short_circuits() {
        let fx = Fixture::new(false);
        std::fs::remove_file(&fx.cookie_path).unwrap();
        let orchestrator = fx.orchestrator(ResponseContract::Metadata);

        let outcome = orchestrator.run("job-1", &request()).await;

        assert_eq!(
            outcome,
            JobOutcome::Failure {
                kind: ErrorKind::Configuration,
                message: "COOKIE_FILE environment variable not set".to_string(),
            }
        );
        assert!(fx.extractor.cookies_seen.lock().unwrap().is_empty());
        assert_eq!(fx.provider.uploads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_request_rejects_unknown_fields() {
        let result: Result<JobRequest, _> = serde_json::from_value(json!({
            "video_url": "https://example.com/watch?v=abc",
            "format": "webm"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_request_optional_fields() {
        let request: JobRequest = serde_json::from_value(json!({
            "video_url": "https://example.com/watch?v=abc",
            "webhook_url": "https://hooks.example.com/done",
            "id": "client-42"
        }))
        .unwrap();

        assert_eq!(request.client_id.as_deref(), Some("client-42"));
        assert_eq!(
            request.webhook_url.map(String::from).as_deref(),
            Some("https://hooks.example.com/done")
        );

        let invalid: Result<JobRequest, _> =
            serde_json::from_value(json!({"video_url": "not a url"}));
        assert!(invalid.is_err());
    }
}

use super::types::DownloadResult;
use crate::error::PipelineResult;
use async_trait::async_trait;
use std::path::Path;

#[async_trait]
pub trait Extractor: Send + Sync {
    /// Human-readable name of the extraction backend
    fn name(&self) -> &'static str;

    /// Fetch exactly one media file for `url` onto local disk.
    ///
    /// Passing `None` for the cookie file runs the unauthenticated flow; callers
    /// that only need the path can ignore the reported dimensions.
    async fn download(
        &self,
        url: &str,
        cookie_file: Option<&Path>,
        job_id: &str,
    ) -> PipelineResult<DownloadResult>;
}

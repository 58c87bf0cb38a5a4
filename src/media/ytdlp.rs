use super::{
    extractor::Extractor,
    types::{DownloadResult, MediaMetadata},
};
use crate::error::{PipelineError, PipelineResult};
use crate::utils::sanitize_filename;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, error, info, warn};

const OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";

pub struct YtDlpExtractor {
    binary: String,
    output_dir: PathBuf,
    format: String,
}

impl YtDlpExtractor {
    pub fn new(
        binary: impl Into<String>,
        output_dir: impl Into<PathBuf>,
        format: impl Into<String>,
    ) -> Self {
        Self {
            binary: binary.into(),
            output_dir: output_dir.into(),
            format: format.into(),
        }
    }

    /// Options shared by the metadata pass and the download pass, so both
    /// resolve the same output filename.
    fn base_args(&self, cookie_file: Option<&Path>) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--format".into(),
            self.format.clone().into(),
            "--output".into(),
            self.output_dir.join(OUTPUT_TEMPLATE).into_os_string(),
            "--restrict-filenames".into(),
            "--no-playlist".into(),
            "--no-check-certificates".into(),
            "--retries".into(),
            "0".into(),
            "--no-warnings".into(),
        ];

        if let Some(cookie_file) = cookie_file {
            args.push("--cookies".into());
            args.push(cookie_file.as_os_str().to_owned());
        }

        args
    }

    async fn extract_info(
        &self,
        url: &str,
        cookie_file: Option<&Path>,
    ) -> PipelineResult<MediaMetadata> {
        debug!("Extracting metadata with yt-dlp for: {}", url);

        let output = Command::new(&self.binary)
            .args(self.base_args(cookie_file))
            .arg("--dump-json")
            .arg(url)
            .output()
            .await
            .map_err(|e| {
                PipelineError::Extraction(format!("Failed to run {}: {}", self.binary, e))
            })?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::Extraction(format!(
                "Media metadata extraction failed: {}",
                error.trim()
            )));
        }

        parse_metadata(&output.stdout)
    }

    fn resolve_output_path(&self, metadata: &MediaMetadata) -> PathBuf {
        if let Some(filename) = &metadata.filename {
            return PathBuf::from(filename);
        }

        let title = metadata.title.as_deref().unwrap_or("NA");
        let ext = metadata.ext.as_deref().unwrap_or("mp4");
        self.output_dir.join(format!("{}.{}", sanitize_filename(title), ext))
    }

    async fn fetch(&self, url: &str, cookie_file: Option<&Path>) -> PipelineResult<()> {
        let output = Command::new(&self.binary)
            .args(self.base_args(cookie_file))
            .arg(url)
            .output()
            .await
            .map_err(|e| {
                PipelineError::Extraction(format!("Failed to run {}: {}", self.binary, e))
            })?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::Extraction(format!(
                "Media download failed: {}",
                error.trim()
            )));
        }

        Ok(())
    }

    async fn run(
        &self,
        url: &str,
        cookie_file: Option<&Path>,
    ) -> PipelineResult<DownloadResult> {
        let metadata = self.extract_info(url, cookie_file).await?;
        let output_filename = self.resolve_output_path(&metadata);

        self.fetch(url, cookie_file).await?;

        if !tokio::fs::try_exists(&output_filename).await? {
            return Err(PipelineError::MissingOutput(output_filename));
        }

        Ok(DownloadResult {
            output_filename,
            height: metadata.height,
            width: metadata.width,
        })
    }

    pub async fn test_availability(&self) -> bool {
        match Command::new(&self.binary).arg("--version").output().await {
            Ok(output) => {
                if output.status.success() {
                    let version = String::from_utf8_lossy(&output.stdout);
                    info!("✅ yt-dlp is available, version: {}", version.trim());
                    true
                } else {
                    warn!("❌ yt-dlp command failed");
                    false
                }
            }
            Err(e) => {
                warn!("❌ yt-dlp not found: {}", e);
                false
            }
        }
    }
}

fn parse_metadata(stdout: &[u8]) -> PipelineResult<MediaMetadata> {
    // A single video prints one JSON document per line; only the first matters.
    let line = stdout
        .split(|b| *b == b'\n')
        .find(|line| !line.iter().all(u8::is_ascii_whitespace))
        .ok_or_else(|| PipelineError::Extraction("No media metadata returned".to_string()))?;

    serde_json::from_slice(line).map_err(|e| {
        PipelineError::Extraction(format!("Failed to parse media metadata: {}", e))
    })
}

#[async_trait]
impl Extractor for YtDlpExtractor {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn download(
        &self,
        url: &str,
        cookie_file: Option<&Path>,
        job_id: &str,
    ) -> PipelineResult<DownloadResult> {
        info!("Job {}: Downloading video from URL: {}", job_id, url);

        match self.run(url, cookie_file).await {
            Ok(result) => {
                info!(
                    "Job {}: Video saved to {}",
                    job_id,
                    result.output_filename.display()
                );
                Ok(result)
            }
            Err(e) => {
                error!("Job {}: Error during video download - {}", job_id, e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn extractor(dir: &Path) -> YtDlpExtractor {
        YtDlpExtractor::new("yt-dlp", dir, "best[ext=mp4]")
    }

    #[test]
    fn test_base_args() {
        let ex = extractor(Path::new("/tmp/"));
        let args = ex.base_args(None);

        assert!(args.contains(&OsString::from("--no-playlist")));
        assert!(args.contains(&OsString::from("--no-check-certificates")));
        assert!(args.contains(&OsString::from("--restrict-filenames")));
        assert!(args.contains(&OsString::from("best[ext=mp4]")));
        assert!(args.contains(&OsString::from("/tmp/%(title)s.%(ext)s")));
        assert!(!args.contains(&OsString::from("--cookies")));
    }

    #[test]
    fn test_base_args_with_cookies() {
        let ex = extractor(Path::new("/tmp/"));
        let args = ex.base_args(Some(Path::new("/tmp/cookiefile.txt")));

        let pos = args
            .iter()
            .position(|a| a == "--cookies")
            .expect("cookies flag");
        assert_eq!(args[pos + 1], OsString::from("/tmp/cookiefile.txt"));
    }

    #[test]
    fn test_parse_metadata() {
        let json = br#"{"title": "Big Buck Bunny", "ext": "mp4", "_filename": "/tmp/Big_Buck_Bunny.mp4", "width": 1280, "height": 720}"#;
        let metadata = parse_metadata(json).unwrap();

        assert_eq!(metadata.title.as_deref(), Some("Big Buck Bunny"));
        assert_eq!(metadata.width, Some(1280));
        assert_eq!(metadata.height, Some(720));
        assert_eq!(
            metadata.filename.as_deref(),
            Some("/tmp/Big_Buck_Bunny.mp4")
        );
    }

    #[test]
    fn test_parse_metadata_null_dimensions() {
        let json = b"\n{\"title\": \"Podcast\", \"ext\": \"m4a\", \"width\": null, \"height\": null}\n";
        let metadata = parse_metadata(json).unwrap();

        assert_eq!(metadata.width, None);
        assert_eq!(metadata.height, None);
    }

    #[test]
    fn test_parse_metadata_invalid() {
        assert!(matches!(
            parse_metadata(b"not json"),
            Err(PipelineError::Extraction(_))
        ));
        assert!(matches!(
            parse_metadata(b"  \n"),
            Err(PipelineError::Extraction(_))
        ));
    }

    #[test]
    fn test_resolve_output_path() {
        let ex = extractor(Path::new("/tmp/"));

        let from_backend = MediaMetadata {
            title: Some("ignored".to_string()),
            ext: Some("mp4".to_string()),
            filename: Some("/tmp/Backend_Name.mp4".to_string()),
            width: None,
            height: None,
        };
        assert_eq!(
            ex.resolve_output_path(&from_backend),
            PathBuf::from("/tmp/Backend_Name.mp4")
        );

        let computed = MediaMetadata {
            title: Some("My Video: Part 2".to_string()),
            ext: Some("mp4".to_string()),
            filename: None,
            width: None,
            height: None,
        };
        assert_eq!(
            ex.resolve_output_path(&computed),
            PathBuf::from("/tmp/My_Video_-_Part_2.mp4")
        );
    }

    #[cfg(unix)]
    fn fake_backend(dir: &Path, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fake-yt-dlp");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path.to_string_lossy().to_string()
    }

    #[cfg(unix)]
    fn dump_json_script(output: &Path, create_file: bool) -> String {
        let touch = if create_file {
            format!("touch '{}'", output.display())
        } else {
            String::new()
        };
        format!(
            r#"for arg in "$@"; do
  if [ "$arg" = "--dump-json" ]; then
    printf '%s\n' '{{"title":"Clip","ext":"mp4","_filename":"{}","width":1280,"height":720}}'
    exit 0
  fi
done
{}
exit 0"#,
            output.display(),
            touch
        )
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_download_reports_path_and_dimensions() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("Clip.mp4");
        let binary = fake_backend(dir.path(), &dump_json_script(&output, true));
        let ex = YtDlpExtractor::new(binary, dir.path(), "best[ext=mp4]");

        let result = ex
            .download("https://example.com/watch?v=abc", None, "job-1")
            .await
            .unwrap();

        assert_eq!(result.output_filename, output);
        assert_eq!(result.width, Some(1280));
        assert_eq!(result.height, Some(720));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_download_missing_output() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("Clip.mp4");
        let binary = fake_backend(dir.path(), &dump_json_script(&output, false));
        let ex = YtDlpExtractor::new(binary, dir.path(), "best[ext=mp4]");

        let err = ex
            .download("https://example.com/watch?v=abc", None, "job-2")
            .await
            .unwrap_err();

        match err {
            PipelineError::MissingOutput(path) => assert_eq!(path, output),
            other => panic!("expected MissingOutput, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_download_backend_failure() {
        let dir = TempDir::new().unwrap();
        let binary = fake_backend(
            dir.path(),
            "echo 'ERROR: Unsupported URL: https://example.com/' >&2\nexit 1",
        );
        let ex = YtDlpExtractor::new(binary, dir.path(), "best[ext=mp4]");

        let err = ex
            .download("https://example.com/", None, "job-3")
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Extraction(_)));
        assert!(err.to_string().contains("Unsupported URL"));
    }

    #[tokio::test]
    async fn test_download_binary_not_found() {
        let dir = TempDir::new().unwrap();
        let ex = YtDlpExtractor::new(
            dir.path().join("no-such-binary").to_string_lossy().to_string(),
            dir.path(),
            "best[ext=mp4]",
        );

        let err = ex
            .download("https://example.com/", None, "job-4")
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Extraction(_)));
    }

    #[tokio::test]
    #[ignore] // Requires yt-dlp to be installed
    async fn test_availability() {
        let ex = extractor(Path::new("/tmp/"));
        assert!(ex.test_availability().await);
    }
}

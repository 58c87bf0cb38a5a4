use std::path::PathBuf;
use thiserror::Error;

/// Failures a download job can run into, one variant per pipeline stage.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    Configuration(String),

    #[error("Extraction failed: {0}")]
    Extraction(String),

    #[error("Output file '{}' does not exist after download.", .0.display())]
    MissingOutput(PathBuf),

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("{0}")]
    UnsupportedOperation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stage tag of a failed job, used for logging. Never sent to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Extraction,
    MissingOutput,
    Upload,
    Download,
    UnsupportedOperation,
    Io,
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Configuration(_) => ErrorKind::Configuration,
            PipelineError::Extraction(_) => ErrorKind::Extraction,
            PipelineError::MissingOutput(_) => ErrorKind::MissingOutput,
            PipelineError::Upload(_) => ErrorKind::Upload,
            PipelineError::Download(_) => ErrorKind::Download,
            PipelineError::UnsupportedOperation(_) => ErrorKind::UnsupportedOperation,
            PipelineError::Io(_) => ErrorKind::Io,
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;

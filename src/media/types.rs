use serde::Deserialize;
use std::path::PathBuf;

/// What a single extraction produced on local disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadResult {
    pub output_filename: PathBuf,
    pub height: Option<u32>,
    pub width: Option<u32>,
}

/// The subset of the backend's `--dump-json` output the adapter relies on.
#[derive(Debug, Deserialize)]
pub struct MediaMetadata {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub ext: Option<String>,
    #[serde(default, rename = "_filename")]
    pub filename: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which success body a download job produces.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResponseContract {
    /// Bare cloud URL, no cookie resolution.
    Url,
    /// `{cloud_url, height, width}`, cookie resolved for every job.
    #[default]
    Metadata,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: String,
    pub api_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
            api_key: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: "json".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DownloadConfig {
    pub output_dir: PathBuf,
    pub cookie_path: PathBuf,
    /// Remote location of the cookie artifact.
    pub cookie_source: Option<String>,
    pub ytdlp_binary: String,
    pub format: String,
    pub contract: ResponseContract,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("/tmp/"),
            cookie_path: PathBuf::from("/tmp/cookiefile.txt"),
            cookie_source: None,
            ytdlp_binary: "yt-dlp".to_string(),
            format: "best[ext=mp4]".to_string(),
            contract: ResponseContract::default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    /// Where providers stage objects fetched from the cloud before they are moved.
    pub staging_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            staging_dir: PathBuf::from("/tmp/"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub download: DownloadConfig,
    pub storage: StorageConfig,
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path))?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Failed to parse config file")
    }

    pub fn get_logging_format(&self) -> &str {
        &self.logging.format
    }

    /// Applies `API_KEY` and `COOKIE_FILE` from the environment on top of the file values.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(api_key) = lookup("API_KEY").filter(|v| !v.is_empty()) {
            self.server.api_key = Some(api_key);
        }
        if let Some(source) = lookup("COOKIE_FILE").filter(|v| !v.is_empty()) {
            self.download.cookie_source = Some(source);
        }
        self
    }
}

use crate::quality::QualityPolicy;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_dir: Option<String>,
    pub images_dir: Option<String>,
    pub import_folders: Option<Vec<String>>,
    pub metadata_url: Option<String>,
    pub metadata_timeout_sec: Option<u64>,
    pub status_log_interval_secs: Option<u64>,

    // Sections
    pub rate_limits: Option<RateLimitsConfig>,
    pub fetcher: Option<FetcherConfig>,
    pub quality: Option<QualityPolicy>,
    pub import: Option<ImportConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct RateLimitsConfig {
    pub api_interval_ms: Option<u64>,
    pub api_short_interval_ms: Option<u64>,
    pub image_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct FetcherConfig {
    pub max_attempts: Option<u32>,
    pub retry_delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ImportConfig {
    pub remove_discarded_files: Option<bool>,
    /// Extensions without the leading dot, e.g. `["mkv", "mp4"]`.
    pub video_extensions: Option<Vec<String>>,
    pub download_characters: Option<bool>,
    pub download_creators: Option<bool>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}

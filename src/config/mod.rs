mod file_config;

pub use file_config::{FetcherConfig, FileConfig, ImportConfig, RateLimitsConfig};

use crate::commands::HandlerSettings;
use crate::library::DEFAULT_VIDEO_EXTENSIONS;
use crate::quality::{ConfigError, QualityPolicy};
use crate::rate_limiter::RateLimiterConfig;
use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::time::Duration;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub images_dir: Option<PathBuf>,
    pub import_folders: Vec<PathBuf>,
    pub metadata_url: Option<String>,
    pub metadata_timeout_sec: u64,
    pub status_log_interval_secs: u64,
    pub remove_discarded_files: bool,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub db_dir: PathBuf,
    pub images_dir: PathBuf,
    pub import_folders: Vec<PathBuf>,
    pub metadata_url: String,
    pub metadata_timeout_sec: u64,
    /// Zero disables the periodic status line.
    pub status_log_interval_secs: u64,

    // Feature configs (with defaults)
    pub rate_limits: RateLimitSettings,
    pub fetcher: FetcherSettings,
    pub quality: QualityPolicy,
    pub import: ImportSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        // TOML overrides CLI for each field
        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        // Validate db_dir exists
        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let images_dir = file
            .images_dir
            .map(PathBuf::from)
            .or_else(|| cli.images_dir.clone())
            .unwrap_or_else(|| db_dir.join("images"));

        let import_folders = file
            .import_folders
            .map(|folders| folders.into_iter().map(PathBuf::from).collect())
            .unwrap_or_else(|| cli.import_folders.clone());

        let metadata_url = file
            .metadata_url
            .or_else(|| cli.metadata_url.clone())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "metadata_url must be specified via --metadata-url or in config file"
                )
            })?;

        let metadata_timeout_sec = file
            .metadata_timeout_sec
            .unwrap_or(cli.metadata_timeout_sec);
        let status_log_interval_secs = file
            .status_log_interval_secs
            .unwrap_or(cli.status_log_interval_secs);

        // Rate limits - merge file config with defaults
        let limits_file = file.rate_limits.unwrap_or_default();
        let rate_limits = RateLimitSettings {
            api_interval: Duration::from_millis(limits_file.api_interval_ms.unwrap_or(2500)),
            api_short_interval: Duration::from_millis(
                limits_file.api_short_interval_ms.unwrap_or(1000),
            ),
            image_interval: Duration::from_millis(limits_file.image_interval_ms.unwrap_or(1000)),
        };
        rate_limits
            .validate()
            .context("Invalid [rate_limits] section")?;

        let fetcher_file = file.fetcher.unwrap_or_default();
        let fetcher = FetcherSettings {
            max_attempts: fetcher_file.max_attempts.unwrap_or(5),
            retry_delay: Duration::from_millis(fetcher_file.retry_delay_ms.unwrap_or(500)),
        };
        if fetcher.max_attempts == 0 {
            bail!("fetcher.max_attempts must be at least 1");
        }

        let quality = file.quality.unwrap_or_default();
        quality.validate().context("Invalid [quality] section")?;

        let import_file = file.import.unwrap_or_default();
        let import = ImportSettings {
            remove_discarded_files: import_file
                .remove_discarded_files
                .unwrap_or(cli.remove_discarded_files),
            video_extensions: normalize_extensions(import_file.video_extensions),
            download_characters: import_file.download_characters.unwrap_or(true),
            download_creators: import_file.download_creators.unwrap_or(true),
        };

        Ok(Self {
            db_dir,
            images_dir,
            import_folders,
            metadata_url,
            metadata_timeout_sec,
            status_log_interval_secs,
            rate_limits,
            fetcher,
            quality,
            import,
        })
    }

    pub fn commands_db_path(&self) -> PathBuf {
        self.db_dir.join("commands.db")
    }

    pub fn library_db_path(&self) -> PathBuf {
        self.db_dir.join("library.db")
    }

    /// Staging area for image downloads, on the same file system as the
    /// images so the final move is a rename.
    pub fn temp_dir(&self) -> PathBuf {
        self.images_dir.join(".tmp")
    }

    pub fn handler_settings(&self) -> HandlerSettings {
        HandlerSettings {
            images_dir: self.images_dir.clone(),
            remove_discarded_files: self.import.remove_discarded_files,
            video_extensions: self.import.video_extensions.clone(),
            image_max_attempts: self.fetcher.max_attempts,
            download_characters: self.import.download_characters,
            download_creators: self.import.download_creators,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitSettings {
    pub api_interval: Duration,
    pub api_short_interval: Duration,
    pub image_interval: Duration,
}

impl RateLimitSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_interval.is_zero() {
            return Err(ConfigError::InvalidRateLimit {
                limiter: "api",
                reason: "interval must be positive".to_string(),
            });
        }
        if self.api_short_interval > self.api_interval {
            return Err(ConfigError::InvalidRateLimit {
                limiter: "api",
                reason: "short interval is longer than the interval".to_string(),
            });
        }
        if self.image_interval.is_zero() {
            return Err(ConfigError::InvalidRateLimit {
                limiter: "images",
                reason: "interval must be positive".to_string(),
            });
        }
        Ok(())
    }

    pub fn api(&self) -> RateLimiterConfig {
        RateLimiterConfig::new(self.api_interval).with_short_interval(self.api_short_interval)
    }

    pub fn images(&self) -> RateLimiterConfig {
        RateLimiterConfig::new(self.image_interval)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetcherSettings {
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportSettings {
    pub remove_discarded_files: bool,
    pub video_extensions: Vec<String>,
    pub download_characters: bool,
    pub download_creators: bool,
}

fn normalize_extensions(extensions: Option<Vec<String>>) -> Vec<String> {
    match extensions {
        Some(list) => list
            .iter()
            .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect(),
        None => DEFAULT_VIDEO_EXTENSIONS
            .iter()
            .map(|e| e.to_string())
            .collect(),
    }
}

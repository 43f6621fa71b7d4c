//! Rate limited image download with fixed back-off retries.

use super::error::FetchError;
use super::image_format::{ImageFormat, MIN_SIGNATURE_LEN};
use super::transport::ArtifactTransport;
use crate::rate_limiter::RateLimiter;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// A validated payload waiting in the temp directory.
#[derive(Debug)]
pub struct FetchedArtifact {
    pub temp_path: PathBuf,
    pub format: ImageFormat,
    /// Final location, the requested destination plus the detected extension.
    pub destination: PathBuf,
}

impl FetchedArtifact {
    /// Moves the payload to its destination, creating the parent directory.
    /// An existing file is replaced by the rename itself, so it survives a
    /// failed move.
    pub async fn move_into_place(self) -> Result<PathBuf, FetchError> {
        if let Some(parent) = self.destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        if let Err(e) = tokio::fs::rename(&self.temp_path, &self.destination).await {
            let _ = tokio::fs::remove_file(&self.temp_path).await;
            return Err(e.into());
        }
        Ok(self.destination)
    }
}

/// `destination` with `.extension` appended to its file name. Dots already in
/// the name are kept.
fn append_extension(destination: &Path, extension: &str) -> PathBuf {
    let mut path = destination.as_os_str().to_owned();
    path.push(".");
    path.push(extension);
    PathBuf::from(path)
}

pub struct ArtifactFetcher {
    transport: Arc<dyn ArtifactTransport>,
    limiter: Arc<RateLimiter>,
    temp_dir: PathBuf,
    retry_delay: Duration,
    temp_counter: AtomicU64,
}

impl ArtifactFetcher {
    pub fn new(
        transport: Arc<dyn ArtifactTransport>,
        limiter: Arc<RateLimiter>,
        temp_dir: PathBuf,
        retry_delay: Duration,
    ) -> Self {
        Self {
            transport,
            limiter,
            temp_dir,
            retry_delay,
            temp_counter: AtomicU64::new(0),
        }
    }

    /// Fetches `url` into a temp file.
    ///
    /// Transport failures are retried up to `max_attempts` in total with a
    /// fixed delay. Content that is too short or not a supported image fails
    /// immediately. Nothing is written at `destination` until the returned
    /// artifact is moved into place.
    pub async fn fetch_to_file(
        &self,
        url: &str,
        destination: &Path,
        max_attempts: u32,
    ) -> Result<FetchedArtifact, FetchError> {
        let max_attempts = max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            self.limiter.ensure_rate().await;
            debug!("Fetching {} (attempt {}/{})", url, attempt, max_attempts);

            match self.transport.get_bytes(url).await {
                Ok(bytes) => return self.write_temp(url, &bytes, destination).await,
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    warn!(
                        "Fetch of {} failed (attempt {}/{}): {}",
                        url, attempt, max_attempts, e
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn write_temp(
        &self,
        url: &str,
        bytes: &[u8],
        destination: &Path,
    ) -> Result<FetchedArtifact, FetchError> {
        if bytes.len() < MIN_SIGNATURE_LEN {
            return Err(FetchError::content(
                url,
                format!("payload too short ({} bytes)", bytes.len()),
            ));
        }
        let format = ImageFormat::detect(bytes)
            .ok_or_else(|| FetchError::content(url, "unrecognised image signature"))?;

        tokio::fs::create_dir_all(&self.temp_dir).await?;
        let temp_name = format!(
            "{}-{}.{}",
            std::process::id(),
            self.temp_counter.fetch_add(1, Ordering::Relaxed),
            format.extension()
        );
        let temp_path = self.temp_dir.join(temp_name);
        tokio::fs::write(&temp_path, bytes).await?;

        Ok(FetchedArtifact {
            temp_path,
            format,
            destination: append_extension(destination, format.extension()),
        })
    }
}

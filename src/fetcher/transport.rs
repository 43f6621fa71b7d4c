//! Byte transport used by the artifact fetcher.

use super::error::FetchError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;

/// Fetches the raw body behind a URL.
#[async_trait]
pub trait ArtifactTransport: Send + Sync {
    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// HTTP transport backed by reqwest.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ArtifactTransport for HttpTransport {
    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::transport(url, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::transport(url, format!("status {}", status)));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::transport(url, e.to_string()))?;
        Ok(body.to_vec())
    }
}

//! HTTP client for the metadata service.

use super::models::{RemoteCreator, RemoteFile, RemoteSeries};
use super::{MetadataProvider, ProviderError};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Cooldown applied when a ban response carries no Retry-After header.
pub const DEFAULT_BAN_COOLDOWN: Duration = Duration::from_secs(30 * 60);

pub struct HttpMetadataClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpMetadataClient {
    /// # Arguments
    /// * `base_url` - Base URL of the metadata service (e.g., "http://localhost:9000")
    /// * `timeout_sec` - Request timeout in seconds
    pub fn new(base_url: &str, timeout_sec: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_sec))
            .build()
            .context("Failed to create HTTP client")?;

        // Ensure base_url doesn't have trailing slash
        let base_url = base_url.trim_end_matches('/').to_string();

        Ok(Self { client, base_url })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ProviderError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ProviderError::NotFound);
        }
        if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after)
                .unwrap_or(DEFAULT_BAN_COOLDOWN);
            return Err(ProviderError::Banned { retry_after });
        }
        if !status.is_success() {
            return Err(ProviderError::Transport(format!("status {}", status)));
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }
}

fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

#[async_trait]
impl MetadataProvider for HttpMetadataClient {
    async fn identify_file(&self, hash: &str, size: u64) -> Result<RemoteFile, ProviderError> {
        let url = format!("{}/files?hash={}&size={}", self.base_url, hash, size);
        self.get_json(&url).await
    }

    async fn get_series(&self, series_id: i64) -> Result<RemoteSeries, ProviderError> {
        let url = format!("{}/series/{}", self.base_url, series_id);
        self.get_json(&url).await
    }

    async fn get_creator(&self, creator_id: i64) -> Result<RemoteCreator, ProviderError> {
        let url = format!("{}/creators/{}", self.base_url, creator_id);
        self.get_json(&url).await
    }
}

//! Remote metadata service.

mod client;
mod models;

pub use client::{HttpMetadataClient, DEFAULT_BAN_COOLDOWN};
pub use models::{RemoteCharacter, RemoteCreator, RemoteFile, RemoteSeries};

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("not found")]
    NotFound,

    /// The service refuses further calls for a while.
    #[error("banned by metadata service, retry after {retry_after:?}")]
    Banned { retry_after: Duration },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Source of file identification and series data. Callers apply rate
/// limiting before each call.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn identify_file(&self, hash: &str, size: u64) -> Result<RemoteFile, ProviderError>;

    async fn get_series(&self, series_id: i64) -> Result<RemoteSeries, ProviderError>;

    /// Single-record lookup, cheap enough for the short rate interval.
    async fn get_creator(&self, creator_id: i64) -> Result<RemoteCreator, ProviderError>;
}

//! In-process stand-ins for the remote services.

use async_trait::async_trait;
use media_librarian::fetcher::{ArtifactTransport, FetchError};
use media_librarian::metadata::{
    MetadataProvider, ProviderError, RemoteCharacter, RemoteCreator, RemoteFile, RemoteSeries,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub fn remote_file(episode_id: i64, series_id: i64, resolution: &str) -> RemoteFile {
    RemoteFile {
        episode_id,
        series_id,
        source: "bd".to_string(),
        resolution: resolution.to_string(),
        video_codecs: vec!["hevc".to_string()],
        audio_codecs: vec!["flac".to_string()],
        video_bit_depth: Some(10),
        subtitle_streams: 1,
        group_name: Some("Group".to_string()),
        group_short_name: Some("GRP".to_string()),
        is_deprecated: false,
        version: 1,
        is_chaptered: false,
    }
}

pub fn remote_series(id: i64, character_ids: &[i64]) -> RemoteSeries {
    RemoteSeries {
        id,
        title: format!("Series {}", id),
        episode_count: 12,
        cover_url: Some(format!("http://img/series/{}", id)),
        characters: character_ids
            .iter()
            .map(|char_id| RemoteCharacter {
                id: *char_id,
                name: format!("Character {}", char_id),
                picture_url: Some(format!("http://img/characters/{}", char_id)),
                creator_id: None,
            })
            .collect(),
    }
}

#[derive(Default)]
pub struct FakeMetadata {
    files: Mutex<HashMap<String, RemoteFile>>,
    series: Mutex<HashMap<i64, RemoteSeries>>,
    identify_calls: AtomicUsize,
}

impl FakeMetadata {
    pub fn add_file(&self, hash: &str, file: RemoteFile) {
        self.files.lock().unwrap().insert(hash.to_string(), file);
    }

    pub fn add_series(&self, series: RemoteSeries) {
        self.series.lock().unwrap().insert(series.id, series);
    }

    pub fn identify_calls(&self) -> usize {
        self.identify_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataProvider for FakeMetadata {
    async fn identify_file(&self, hash: &str, _size: u64) -> Result<RemoteFile, ProviderError> {
        self.identify_calls.fetch_add(1, Ordering::SeqCst);
        self.files
            .lock()
            .unwrap()
            .get(hash)
            .cloned()
            .ok_or(ProviderError::NotFound)
    }

    async fn get_series(&self, series_id: i64) -> Result<RemoteSeries, ProviderError> {
        self.series
            .lock()
            .unwrap()
            .get(&series_id)
            .cloned()
            .ok_or(ProviderError::NotFound)
    }

    async fn get_creator(&self, _creator_id: i64) -> Result<RemoteCreator, ProviderError> {
        Err(ProviderError::NotFound)
    }
}

#[derive(Default)]
pub struct FakeTransport {
    bodies: Mutex<HashMap<String, Vec<u8>>>,
}

impl FakeTransport {
    pub fn serve(&self, url: &str, body: &[u8]) {
        self.bodies
            .lock()
            .unwrap()
            .insert(url.to_string(), body.to_vec());
    }
}

#[async_trait]
impl ArtifactTransport for FakeTransport {
    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.bodies
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::transport(url, "status 404 Not Found"))
    }
}

//! Fakes and a ready-made context for handler and worker tests.

use super::{CommandContext, HandlerSettings, QueueSet, SqliteCommandStore};
use crate::fetcher::{ArtifactFetcher, ArtifactTransport, FetchError};
use crate::library::LibraryStore;
use crate::metadata::{
    MetadataProvider, ProviderError, RemoteCharacter, RemoteCreator, RemoteFile, RemoteSeries,
};
use crate::quality::QualityFilter;
use crate::rate_limiter::{RateLimiter, RateLimiterConfig};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// SHA-256 of `b"abc"`.
pub const FILE_HASH: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

pub fn remote_file(episode_id: i64, series_id: i64) -> RemoteFile {
    RemoteFile {
        episode_id,
        series_id,
        source: "bd".to_string(),
        resolution: "1920x1080".to_string(),
        video_codecs: vec!["hevc".to_string()],
        audio_codecs: vec!["flac".to_string()],
        video_bit_depth: Some(10),
        subtitle_streams: 1,
        group_name: Some("Group".to_string()),
        group_short_name: Some("GRP".to_string()),
        is_deprecated: false,
        version: 1,
        is_chaptered: true,
    }
}

pub fn remote_series(id: i64, characters: &[(i64, &str)]) -> RemoteSeries {
    RemoteSeries {
        id,
        title: format!("Series {}", id),
        episode_count: 12,
        cover_url: Some(format!("http://img/series/{}", id)),
        characters: characters
            .iter()
            .map(|(char_id, name)| RemoteCharacter {
                id: *char_id,
                name: name.to_string(),
                picture_url: Some(format!("http://img/characters/{}", char_id)),
                creator_id: None,
            })
            .collect(),
    }
}

pub fn remote_creator(id: i64, name: &str) -> RemoteCreator {
    RemoteCreator {
        id,
        name: name.to_string(),
        picture_url: Some(format!("http://img/creators/{}", id)),
    }
}

#[derive(Default)]
pub struct FakeMetadata {
    files: Mutex<HashMap<String, RemoteFile>>,
    series: Mutex<HashMap<i64, RemoteSeries>>,
    creators: Mutex<HashMap<i64, RemoteCreator>>,
    failure: Mutex<Option<String>>,
    ban: Mutex<Option<Duration>>,
    identify_delay: Mutex<Option<Duration>>,
    panic_on_identify: AtomicBool,
    identify_calls: AtomicUsize,
    series_calls: AtomicUsize,
    creator_calls: AtomicUsize,
}

impl FakeMetadata {
    pub fn add_file(&self, hash: &str, file: RemoteFile) {
        self.files.lock().unwrap().insert(hash.to_string(), file);
    }

    pub fn add_series(&self, series: RemoteSeries) {
        self.series.lock().unwrap().insert(series.id, series);
    }

    pub fn add_creator(&self, creator: RemoteCreator) {
        self.creators.lock().unwrap().insert(creator.id, creator);
    }

    pub fn fail_identify(&self, message: &str) {
        *self.failure.lock().unwrap() = Some(message.to_string());
    }

    pub fn panic_on_identify(&self) {
        self.panic_on_identify.store(true, Ordering::SeqCst);
    }

    /// Every identification takes at least `delay`.
    pub fn slow_identify(&self, delay: Duration) {
        *self.identify_delay.lock().unwrap() = Some(delay);
    }

    /// The next call answers with a ban.
    pub fn ban_once(&self, retry_after: Duration) {
        *self.ban.lock().unwrap() = Some(retry_after);
    }

    pub fn identify_calls(&self) -> usize {
        self.identify_calls.load(Ordering::SeqCst)
    }

    pub fn series_calls(&self) -> usize {
        self.series_calls.load(Ordering::SeqCst)
    }

    pub fn creator_calls(&self) -> usize {
        self.creator_calls.load(Ordering::SeqCst)
    }

    fn check_ban(&self) -> Result<(), ProviderError> {
        match self.ban.lock().unwrap().take() {
            Some(retry_after) => Err(ProviderError::Banned { retry_after }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl MetadataProvider for FakeMetadata {
    async fn identify_file(&self, hash: &str, _size: u64) -> Result<RemoteFile, ProviderError> {
        self.identify_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.identify_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.panic_on_identify.load(Ordering::SeqCst) {
            panic!("metadata provider blew up");
        }
        self.check_ban()?;
        if let Some(message) = self.failure.lock().unwrap().clone() {
            return Err(ProviderError::Transport(message));
        }
        self.files
            .lock()
            .unwrap()
            .get(hash)
            .cloned()
            .ok_or(ProviderError::NotFound)
    }

    async fn get_series(&self, series_id: i64) -> Result<RemoteSeries, ProviderError> {
        self.series_calls.fetch_add(1, Ordering::SeqCst);
        self.check_ban()?;
        self.series
            .lock()
            .unwrap()
            .get(&series_id)
            .cloned()
            .ok_or(ProviderError::NotFound)
    }

    async fn get_creator(&self, creator_id: i64) -> Result<RemoteCreator, ProviderError> {
        self.creator_calls.fetch_add(1, Ordering::SeqCst);
        self.check_ban()?;
        self.creators
            .lock()
            .unwrap()
            .get(&creator_id)
            .cloned()
            .ok_or(ProviderError::NotFound)
    }
}

#[derive(Default)]
pub struct FakeTransport {
    bodies: Mutex<HashMap<String, Vec<u8>>>,
    calls: AtomicUsize,
}

impl FakeTransport {
    pub fn serve(&self, url: &str, body: &[u8]) {
        self.bodies
            .lock()
            .unwrap()
            .insert(url.to_string(), body.to_vec());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArtifactTransport for FakeTransport {
    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.bodies
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::transport(url, "status 404 Not Found"))
    }
}

pub struct TestHarness {
    pub dir: TempDir,
    pub ctx: CommandContext,
    pub metadata: Arc<FakeMetadata>,
    pub transport: Arc<FakeTransport>,
    pub commands: Arc<SqliteCommandStore>,
}

impl TestHarness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let metadata = Arc::new(FakeMetadata::default());
        let transport = Arc::new(FakeTransport::default());
        let commands = Arc::new(SqliteCommandStore::in_memory().unwrap());
        let queues = Arc::new(QueueSet::load(commands.clone()).unwrap());

        let fast = RateLimiterConfig::new(Duration::from_millis(1));
        let fetcher = ArtifactFetcher::new(
            transport.clone(),
            Arc::new(RateLimiter::new("images", fast)),
            dir.path().join(".tmp"),
            Duration::from_millis(1),
        );

        let mut settings = HandlerSettings::new(dir.path().join("images"));
        settings.image_max_attempts = 2;

        let ctx = CommandContext {
            library: Arc::new(LibraryStore::in_memory().unwrap()),
            api_limiter: Arc::new(RateLimiter::new("api", fast)),
            metadata: metadata.clone(),
            fetcher: Arc::new(fetcher),
            quality: Arc::new(QualityFilter::default()),
            queues,
            settings,
        };

        Self {
            dir,
            ctx,
            metadata,
            transport,
            commands,
        }
    }
}

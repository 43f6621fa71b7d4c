use super::queue::QueueSet;
use crate::fetcher::{ArtifactFetcher, DEFAULT_MAX_ATTEMPTS};
use crate::library::LibraryStore;
use crate::metadata::MetadataProvider;
use crate::quality::QualityFilter;
use crate::rate_limiter::RateLimiter;
use std::path::PathBuf;
use std::sync::Arc;

/// Settings snapshot read by command handlers.
#[derive(Debug, Clone)]
pub struct HandlerSettings {
    /// Root of downloaded artwork (`series/{id}/cover.*`, `characters/{id}.*`,
    /// `creators/{id}.*`).
    pub images_dir: PathBuf,
    /// Delete rejected and superseded files from disk.
    pub remove_discarded_files: bool,
    /// Lowercase extensions, without the dot.
    pub video_extensions: Vec<String>,
    pub image_max_attempts: u32,
    pub download_characters: bool,
    pub download_creators: bool,
}

impl HandlerSettings {
    pub fn new(images_dir: PathBuf) -> Self {
        Self {
            images_dir,
            remove_discarded_files: false,
            video_extensions: crate::library::DEFAULT_VIDEO_EXTENSIONS
                .iter()
                .map(|e| e.to_string())
                .collect(),
            image_max_attempts: DEFAULT_MAX_ATTEMPTS,
            download_characters: true,
            download_creators: true,
        }
    }
}

/// Shared services handed to every command handler.
#[derive(Clone)]
pub struct CommandContext {
    pub library: Arc<LibraryStore>,

    /// Guards calls to the metadata service.
    pub api_limiter: Arc<RateLimiter>,

    pub metadata: Arc<dyn MetadataProvider>,

    /// Image downloads. Carries its own limiter.
    pub fetcher: Arc<ArtifactFetcher>,

    pub quality: Arc<QualityFilter>,

    /// Follow-on commands go here.
    pub queues: Arc<QueueSet>,

    pub settings: HandlerSettings,
}

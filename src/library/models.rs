//! Library entities: video files, series, characters and creators.

use crate::quality::Resolution;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Retention state of a video file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileStatus {
    /// Kept in the library.
    Active,
    /// Failed the retention gate.
    Rejected,
    /// Outranked by another file for the same episode.
    Superseded,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Active => "ACTIVE",
            FileStatus::Rejected => "REJECTED",
            FileStatus::Superseded => "SUPERSEDED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(FileStatus::Active),
            "REJECTED" => Some(FileStatus::Rejected),
            "SUPERSEDED" => Some(FileStatus::Superseded),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseGroup {
    pub name: String,
    pub short_name: String,
}

impl ReleaseGroup {
    pub fn new(name: impl Into<String>, short_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            short_name: short_name.into(),
        }
    }
}

/// Metadata the remote service returned for an identified file.
///
/// Codec lists hold one entry per stream, in stream order. Names are stored
/// lower-cased.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMediaInfo {
    pub source: String,
    pub resolution: Option<Resolution>,
    pub video_codecs: Vec<String>,
    pub audio_codecs: Vec<String>,
    pub video_bit_depth: Option<u8>,
    pub subtitle_stream_count: u32,
    pub release_group: Option<ReleaseGroup>,
    pub is_deprecated: bool,
    pub version: u32,
    pub is_chaptered: bool,
}

impl Default for FileMediaInfo {
    fn default() -> Self {
        Self {
            source: String::new(),
            resolution: None,
            video_codecs: Vec::new(),
            audio_codecs: Vec::new(),
            video_bit_depth: None,
            subtitle_stream_count: 0,
            release_group: None,
            is_deprecated: false,
            version: 1,
            is_chaptered: false,
        }
    }
}

impl FileMediaInfo {
    pub fn audio_stream_count(&self) -> u32 {
        self.audio_codecs.len() as u32
    }

    pub fn release_group_name(&self) -> Option<&str> {
        self.release_group.as_ref().map(|g| g.name.as_str())
    }
}

/// A physical video file in one of the import folders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoFile {
    /// Zero until the file has been saved.
    pub id: i64,
    pub path: PathBuf,
    /// Hex SHA-256 of the content.
    pub hash: String,
    pub size: u64,
    pub episode_id: Option<i64>,
    pub series_id: Option<i64>,
    pub status: FileStatus,
    /// None until the file has been identified.
    pub media: Option<FileMediaInfo>,
    pub updated_at: i64,
}

impl VideoFile {
    pub fn new(path: impl Into<PathBuf>, hash: impl Into<String>, size: u64) -> Self {
        Self {
            id: 0,
            path: path.into(),
            hash: hash.into(),
            size,
            episode_id: None,
            series_id: None,
            status: FileStatus::Active,
            media: None,
            updated_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn is_identified(&self) -> bool {
        self.media.is_some()
    }
}

/// A series as known to the metadata service. The id is the remote id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub id: i64,
    pub title: String,
    pub episode_count: u32,
    pub cover_url: Option<String>,
    /// Local path of the downloaded cover, with its real extension.
    pub cover_path: Option<PathBuf>,
    pub updated_at: i64,
    /// Set once characters and creators of the series have been stored.
    pub synced_at: Option<i64>,
}

/// A character appearing in a series. The id is the remote id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub id: i64,
    pub series_id: i64,
    pub name: String,
    pub picture_url: Option<String>,
    pub picture_path: Option<PathBuf>,
    pub updated_at: i64,
    pub creator_id: Option<i64>,
}

/// A voice actor or staff member. Shared between series, so it outlives the
/// characters pointing at it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Creator {
    pub id: i64,
    pub name: String,
    pub picture_url: Option<String>,
    pub picture_path: Option<PathBuf>,
    pub updated_at: i64,
}

//! Response shapes of the metadata service.

use crate::library::{FileMediaInfo, ReleaseGroup};
use crate::quality::Resolution;
use serde::{Deserialize, Serialize};

/// Result of identifying a file by hash and size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub episode_id: i64,
    pub series_id: i64,
    #[serde(default)]
    pub source: String,
    /// `WIDTHxHEIGHT`
    #[serde(default)]
    pub resolution: String,
    #[serde(default)]
    pub video_codecs: Vec<String>,
    #[serde(default)]
    pub audio_codecs: Vec<String>,
    pub video_bit_depth: Option<u8>,
    #[serde(default)]
    pub subtitle_streams: u32,
    pub group_name: Option<String>,
    pub group_short_name: Option<String>,
    #[serde(default)]
    pub is_deprecated: bool,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub is_chaptered: bool,
}

fn default_version() -> u32 {
    1
}

impl RemoteFile {
    pub fn media_info(&self) -> FileMediaInfo {
        let release_group = match (&self.group_name, &self.group_short_name) {
            (None, None) => None,
            (name, short) => Some(ReleaseGroup::new(
                name.clone().unwrap_or_default(),
                short.clone().unwrap_or_default(),
            )),
        };
        FileMediaInfo {
            source: self.source.trim().to_lowercase(),
            resolution: Resolution::parse(&self.resolution),
            video_codecs: lowercase_all(&self.video_codecs),
            audio_codecs: lowercase_all(&self.audio_codecs),
            video_bit_depth: self.video_bit_depth,
            subtitle_stream_count: self.subtitle_streams,
            release_group,
            is_deprecated: self.is_deprecated,
            version: self.version,
            is_chaptered: self.is_chaptered,
        }
    }
}

fn lowercase_all(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteCharacter {
    pub id: i64,
    pub name: String,
    pub picture_url: Option<String>,
    /// Voice actor of the character, when the service knows one.
    #[serde(default)]
    pub creator_id: Option<i64>,
}

/// A person credited on a series, looked up on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteCreator {
    pub id: i64,
    pub name: String,
    pub picture_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSeries {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub episode_count: u32,
    pub cover_url: Option<String>,
    #[serde(default)]
    pub characters: Vec<RemoteCharacter>,
}

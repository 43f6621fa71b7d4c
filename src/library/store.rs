//! Row mapping for library entities and the repositories built on them.

use super::models::{
    Character, Creator, FileMediaInfo, FileStatus, ReleaseGroup, Series, VideoFile,
};
use super::schema::LIBRARY_VERSIONED_SCHEMAS;
use crate::quality::Resolution;
use crate::repository::{CachedRepository, IndexDef, IndexValue, StoredEntity};
use crate::sqlite_persistence::VersionedSchema;
use anyhow::Result;
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row, ToSql};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::info;

pub const VIDEO_FILES_BY_HASH: &str = "hash";
pub const VIDEO_FILES_BY_EPISODE: &str = "episode";
pub const VIDEO_FILES_BY_PATH: &str = "path";
pub const CHARACTERS_BY_SERIES: &str = "series";

fn video_file_hash(file: &VideoFile) -> Option<IndexValue> {
    Some(IndexValue::Text(file.hash.clone()))
}

fn video_file_episode(file: &VideoFile) -> Option<IndexValue> {
    file.episode_id.map(IndexValue::Int)
}

fn video_file_path(file: &VideoFile) -> Option<IndexValue> {
    Some(IndexValue::Text(file.path.to_string_lossy().into_owned()))
}

fn character_series(character: &Character) -> Option<IndexValue> {
    Some(IndexValue::Int(character.series_id))
}

const VIDEO_FILE_INDEXES: &[IndexDef<VideoFile>] = &[
    IndexDef {
        name: VIDEO_FILES_BY_HASH,
        column: "hash",
        project: video_file_hash,
    },
    IndexDef {
        name: VIDEO_FILES_BY_EPISODE,
        column: "episode_id",
        project: video_file_episode,
    },
    IndexDef {
        name: VIDEO_FILES_BY_PATH,
        column: "path",
        project: video_file_path,
    },
];

const CHARACTER_INDEXES: &[IndexDef<Character>] = &[IndexDef {
    name: CHARACTERS_BY_SERIES,
    column: "series_id",
    project: character_series,
}];

fn json_error(index: usize, e: serde_json::Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e))
}

fn to_json(values: &[String]) -> rusqlite::Result<String> {
    serde_json::to_string(values).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

fn path_to_sql(path: &Option<PathBuf>) -> Option<String> {
    path.as_ref().map(|p| p.to_string_lossy().into_owned())
}

impl StoredEntity for VideoFile {
    const TABLE: &'static str = "video_files";
    const COLUMNS: &'static str = "id, path, hash, size, episode_id, series_id, status, \
        source, width, height, video_codecs, audio_codecs, video_bit_depth, subtitle_streams, \
        group_name, group_short_name, is_deprecated, version, is_chaptered, identified_at, updated_at";

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let status_str: String = row.get(6)?;
        let status = FileStatus::from_str(&status_str).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                6,
                Type::Text,
                format!("unknown file status '{}'", status_str).into(),
            )
        })?;

        let identified_at: Option<i64> = row.get(19)?;
        let media = match identified_at {
            None => None,
            Some(_) => {
                let width: Option<u32> = row.get(8)?;
                let height: Option<u32> = row.get(9)?;
                let video_codecs: Option<String> = row.get(10)?;
                let audio_codecs: Option<String> = row.get(11)?;
                let group_name: Option<String> = row.get(14)?;
                let group_short_name: Option<String> = row.get(15)?;
                Some(FileMediaInfo {
                    source: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
                    resolution: match (width, height) {
                        (Some(w), Some(h)) if w > 0 && h > 0 => Some(Resolution::new(w, h)),
                        _ => None,
                    },
                    video_codecs: match video_codecs {
                        Some(json) => serde_json::from_str(&json).map_err(|e| json_error(10, e))?,
                        None => Vec::new(),
                    },
                    audio_codecs: match audio_codecs {
                        Some(json) => serde_json::from_str(&json).map_err(|e| json_error(11, e))?,
                        None => Vec::new(),
                    },
                    video_bit_depth: row.get(12)?,
                    subtitle_stream_count: row.get::<_, Option<u32>>(13)?.unwrap_or(0),
                    release_group: match (group_name, group_short_name) {
                        (None, None) => None,
                        (name, short) => Some(ReleaseGroup::new(
                            name.unwrap_or_default(),
                            short.unwrap_or_default(),
                        )),
                    },
                    is_deprecated: row.get::<_, Option<bool>>(16)?.unwrap_or(false),
                    version: row.get::<_, Option<u32>>(17)?.unwrap_or(1),
                    is_chaptered: row.get::<_, Option<bool>>(18)?.unwrap_or(false),
                })
            }
        };

        Ok(VideoFile {
            id: row.get(0)?,
            path: PathBuf::from(row.get::<_, String>(1)?),
            hash: row.get(2)?,
            size: row.get::<_, i64>(3)? as u64,
            episode_id: row.get(4)?,
            series_id: row.get(5)?,
            status,
            media,
            updated_at: row.get(20)?,
        })
    }

    fn upsert(&self, conn: &Connection) -> rusqlite::Result<i64> {
        let media = self.media.as_ref();
        let group = media.and_then(|m| m.release_group.as_ref());
        let resolution = media.and_then(|m| m.resolution);

        let path = self.path.to_string_lossy().into_owned();
        let size = self.size as i64;
        let status = self.status.as_str();
        let source = media.map(|m| m.source.clone());
        let width = resolution.map(|r| r.width);
        let height = resolution.map(|r| r.height);
        let video_codecs = media.map(|m| to_json(&m.video_codecs)).transpose()?;
        let audio_codecs = media.map(|m| to_json(&m.audio_codecs)).transpose()?;
        let video_bit_depth = media.and_then(|m| m.video_bit_depth);
        let subtitle_streams = media.map(|m| m.subtitle_stream_count);
        let group_name = group.map(|g| g.name.clone());
        let group_short_name = group.map(|g| g.short_name.clone());
        let is_deprecated = media.map(|m| m.is_deprecated);
        let version = media.map(|m| m.version);
        let is_chaptered = media.map(|m| m.is_chaptered);
        let identified_at = media.map(|_| self.updated_at);

        let values: [&dyn ToSql; 20] = [
            &path,
            &self.hash,
            &size,
            &self.episode_id,
            &self.series_id,
            &status,
            &source,
            &width,
            &height,
            &video_codecs,
            &audio_codecs,
            &video_bit_depth,
            &subtitle_streams,
            &group_name,
            &group_short_name,
            &is_deprecated,
            &version,
            &is_chaptered,
            &identified_at,
            &self.updated_at,
        ];

        if self.id == 0 {
            conn.execute(
                "INSERT INTO video_files (path, hash, size, episode_id, series_id, status, \
                 source, width, height, video_codecs, audio_codecs, video_bit_depth, \
                 subtitle_streams, group_name, group_short_name, is_deprecated, version, \
                 is_chaptered, identified_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, \
                 ?16, ?17, ?18, ?19, ?20)",
                &values[..],
            )?;
            Ok(conn.last_insert_rowid())
        } else {
            let updated = conn.execute(
                &format!(
                    "UPDATE video_files SET path = ?1, hash = ?2, size = ?3, episode_id = ?4, \
                     series_id = ?5, status = ?6, source = ?7, width = ?8, height = ?9, \
                     video_codecs = ?10, audio_codecs = ?11, video_bit_depth = ?12, \
                     subtitle_streams = ?13, group_name = ?14, group_short_name = ?15, \
                     is_deprecated = ?16, version = ?17, is_chaptered = ?18, \
                     identified_at = ?19, updated_at = ?20 WHERE id = {}",
                    self.id
                ),
                &values[..],
            )?;
            if updated == 0 {
                return Err(rusqlite::Error::QueryReturnedNoRows);
            }
            Ok(self.id)
        }
    }
}

impl StoredEntity for Series {
    const TABLE: &'static str = "series";
    const COLUMNS: &'static str =
        "id, title, episode_count, cover_url, cover_path, updated_at, synced_at";

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Series {
            id: row.get(0)?,
            title: row.get(1)?,
            episode_count: row.get(2)?,
            cover_url: row.get(3)?,
            cover_path: row.get::<_, Option<String>>(4)?.map(PathBuf::from),
            updated_at: row.get(5)?,
            synced_at: row.get(6)?,
        })
    }

    fn upsert(&self, conn: &Connection) -> rusqlite::Result<i64> {
        conn.execute(
            "INSERT INTO series
                (id, title, episode_count, cover_url, cover_path, updated_at, synced_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                episode_count = excluded.episode_count,
                cover_url = excluded.cover_url,
                cover_path = excluded.cover_path,
                updated_at = excluded.updated_at,
                synced_at = excluded.synced_at",
            params![
                self.id,
                self.title,
                self.episode_count,
                self.cover_url,
                path_to_sql(&self.cover_path),
                self.updated_at,
                self.synced_at,
            ],
        )?;
        Ok(self.id)
    }
}

impl StoredEntity for Character {
    const TABLE: &'static str = "characters";
    const COLUMNS: &'static str =
        "id, series_id, name, picture_url, picture_path, updated_at, creator_id";

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Character {
            id: row.get(0)?,
            series_id: row.get(1)?,
            name: row.get(2)?,
            picture_url: row.get(3)?,
            picture_path: row.get::<_, Option<String>>(4)?.map(PathBuf::from),
            updated_at: row.get(5)?,
            creator_id: row.get(6)?,
        })
    }

    fn upsert(&self, conn: &Connection) -> rusqlite::Result<i64> {
        conn.execute(
            "INSERT INTO characters
                (id, series_id, name, picture_url, picture_path, updated_at, creator_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                series_id = excluded.series_id,
                name = excluded.name,
                picture_url = excluded.picture_url,
                picture_path = excluded.picture_path,
                updated_at = excluded.updated_at,
                creator_id = excluded.creator_id",
            params![
                self.id,
                self.series_id,
                self.name,
                self.picture_url,
                path_to_sql(&self.picture_path),
                self.updated_at,
                self.creator_id,
            ],
        )?;
        Ok(self.id)
    }
}

impl StoredEntity for Creator {
    const TABLE: &'static str = "creators";
    const COLUMNS: &'static str = "id, name, picture_url, picture_path, updated_at";

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Creator {
            id: row.get(0)?,
            name: row.get(1)?,
            picture_url: row.get(2)?,
            picture_path: row.get::<_, Option<String>>(3)?.map(PathBuf::from),
            updated_at: row.get(4)?,
        })
    }

    fn upsert(&self, conn: &Connection) -> rusqlite::Result<i64> {
        conn.execute(
            "INSERT INTO creators (id, name, picture_url, picture_path, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                picture_url = excluded.picture_url,
                picture_path = excluded.picture_path,
                updated_at = excluded.updated_at",
            params![
                self.id,
                self.name,
                self.picture_url,
                path_to_sql(&self.picture_path),
                self.updated_at,
            ],
        )?;
        Ok(self.id)
    }
}

/// Repositories over library.db, sharing one connection.
pub struct LibraryStore {
    pub video_files: CachedRepository<VideoFile>,
    pub series: CachedRepository<Series>,
    pub characters: CachedRepository<Character>,
    pub creators: CachedRepository<Creator>,
}

impl LibraryStore {
    pub fn new(db_path: &Path, cached: bool) -> Result<Self> {
        let conn = VersionedSchema::open(LIBRARY_VERSIONED_SCHEMAS, db_path, "library")?;
        let store = Self::with_connection(conn, cached)?;
        info!(
            "Library opened: {} files, {} series",
            store.video_files.count()?,
            store.series.count()?
        );
        Ok(store)
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let conn = VersionedSchema::open_in_memory(LIBRARY_VERSIONED_SCHEMAS)?;
        Self::with_connection(conn, true)
    }

    fn with_connection(conn: Connection, cached: bool) -> Result<Self> {
        let conn = Arc::new(Mutex::new(conn));
        Ok(Self {
            video_files: CachedRepository::new(conn.clone(), VIDEO_FILE_INDEXES, cached)?,
            series: CachedRepository::new(conn.clone(), &[], cached)?,
            characters: CachedRepository::new(conn.clone(), CHARACTER_INDEXES, cached)?,
            creators: CachedRepository::new(conn, &[], cached)?,
        })
    }

    pub fn files_for_episode(&self, episode_id: i64) -> Result<Vec<VideoFile>> {
        self.video_files.get_by_index(VIDEO_FILES_BY_EPISODE, episode_id)
    }

    pub fn file_by_hash(&self, hash: &str) -> Result<Option<VideoFile>> {
        Ok(self
            .video_files
            .get_by_index(VIDEO_FILES_BY_HASH, hash)?
            .into_iter()
            .next())
    }

    pub fn file_by_path(&self, path: &Path) -> Result<Option<VideoFile>> {
        Ok(self
            .video_files
            .get_by_index(VIDEO_FILES_BY_PATH, path.to_string_lossy().into_owned())?
            .into_iter()
            .next())
    }

    pub fn characters_for_series(&self, series_id: i64) -> Result<Vec<Character>> {
        self.characters.get_by_index(CHARACTERS_BY_SERIES, series_id)
    }

    /// Creators voicing at least one character of the series, each once.
    pub fn creators_for_series(&self, series_id: i64) -> Result<Vec<Creator>> {
        let mut creator_ids: Vec<i64> = self
            .characters_for_series(series_id)?
            .into_iter()
            .filter_map(|c| c.creator_id)
            .collect();
        creator_ids.sort_unstable();
        creator_ids.dedup();

        let mut creators = Vec::with_capacity(creator_ids.len());
        for id in creator_ids {
            if let Some(creator) = self.creators.get_by_id(id)? {
                creators.push(creator);
            }
        }
        Ok(creators)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identified_file(path: &str, episode_id: i64) -> VideoFile {
        let mut file = VideoFile::new(path, format!("hash-{path}"), 1024);
        file.episode_id = Some(episode_id);
        file.series_id = Some(7);
        file.media = Some(FileMediaInfo {
            source: "bd".to_string(),
            resolution: Some(Resolution::new(1920, 1080)),
            video_codecs: vec!["hevc".to_string()],
            audio_codecs: vec!["flac".to_string(), "aac".to_string()],
            video_bit_depth: Some(10),
            subtitle_stream_count: 2,
            release_group: Some(ReleaseGroup::new("Group", "GRP")),
            is_deprecated: false,
            version: 2,
            is_chaptered: true,
        });
        file
    }

    #[test]
    fn test_video_file_roundtrip_through_database() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("library.db");

        let mut identified = identified_file("/media/show/01.mkv", 100);
        let mut unidentified = VideoFile::new("/media/show/02.mkv", "abc", 2048);
        {
            let store = LibraryStore::new(&db_path, true).unwrap();
            store.video_files.save(&mut identified).unwrap();
            store.video_files.save(&mut unidentified).unwrap();
        }

        // Uncached reads go straight to SQLite
        let store = LibraryStore::new(&db_path, false).unwrap();
        assert_eq!(
            store.video_files.get_by_id(identified.id).unwrap(),
            Some(identified.clone())
        );
        assert_eq!(
            store.video_files.get_by_id(unidentified.id).unwrap(),
            Some(unidentified)
        );
        assert_eq!(store.files_for_episode(100).unwrap(), vec![identified]);
    }

    #[test]
    fn test_lookup_by_hash_and_path() {
        let store = LibraryStore::in_memory().unwrap();
        let mut file = identified_file("/media/show/03.mkv", 3);
        store.video_files.save(&mut file).unwrap();

        assert_eq!(
            store.file_by_hash("hash-/media/show/03.mkv").unwrap().map(|f| f.id),
            Some(file.id)
        );
        assert_eq!(
            store
                .file_by_path(Path::new("/media/show/03.mkv"))
                .unwrap()
                .map(|f| f.id),
            Some(file.id)
        );
        assert!(store.file_by_hash("missing").unwrap().is_none());
    }

    #[test]
    fn test_status_update_persists() {
        let store = LibraryStore::in_memory().unwrap();
        let mut file = identified_file("/media/show/04.mkv", 4);
        store.video_files.save(&mut file).unwrap();

        file.status = FileStatus::Superseded;
        store.video_files.save(&mut file).unwrap();
        store.video_files.rebuild().unwrap();

        let loaded = store.video_files.get_by_id(file.id).unwrap().unwrap();
        assert_eq!(loaded.status, FileStatus::Superseded);
    }

    #[test]
    fn test_series_and_characters() {
        let store = LibraryStore::in_memory().unwrap();
        let mut series = Series {
            id: 42,
            title: "Show".to_string(),
            episode_count: 12,
            cover_url: Some("http://img/42".to_string()),
            cover_path: None,
            updated_at: 0,
            synced_at: None,
        };
        store.series.save(&mut series).unwrap();
        assert_eq!(series.id, 42);

        for (id, name) in [(1, "Hero"), (2, "Rival")] {
            let mut character = Character {
                id,
                series_id: 42,
                name: name.to_string(),
                picture_url: None,
                picture_path: None,
                updated_at: 0,
                creator_id: Some(9),
            };
            store.characters.save(&mut character).unwrap();
        }
        let mut creator = Creator {
            id: 9,
            name: "Voice".to_string(),
            picture_url: None,
            picture_path: None,
            updated_at: 0,
        };
        store.creators.save(&mut creator).unwrap();
        assert_eq!(store.creators_for_series(42).unwrap(), vec![creator]);

        series.cover_path = Some(PathBuf::from("/images/series/42/cover.png"));
        store.series.save(&mut series).unwrap();

        assert_eq!(store.series.get_by_id(42).unwrap(), Some(series));
        let names: Vec<String> = store
            .characters_for_series(42)
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Hero", "Rival"]);
    }
}

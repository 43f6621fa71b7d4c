//! Database schema for library.db.

use crate::sqlite_column;
use crate::sqlite_persistence::{
    Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP,
};

// =============================================================================
// Series and characters - Version 1
// =============================================================================

const SERIES_TABLE_V1: Table = Table {
    name: "series",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("episode_count", &SqlType::Integer, non_null = true),
        sqlite_column!("cover_url", &SqlType::Text),
        sqlite_column!("cover_path", &SqlType::Text),
        sqlite_column!(
            "updated_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[],
    unique_constraints: &[],
};

const CHARACTERS_TABLE_V1: Table = Table {
    name: "characters",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!(
            "series_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "series",
                foreign_column: "id",
                on_delete: ForeignKeyOnChange::Cascade,
            })
        ),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("picture_url", &SqlType::Text),
        sqlite_column!("picture_path", &SqlType::Text),
        sqlite_column!(
            "updated_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_characters_series_id", "series_id")],
    unique_constraints: &[],
};

// =============================================================================
// Video files - Version 1
// =============================================================================

/// Media columns are all NULL until the file is identified; `identified_at`
/// tells the two states apart.
const VIDEO_FILES_TABLE_V1: Table = Table {
    name: "video_files",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("path", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!("hash", &SqlType::Text, non_null = true),
        sqlite_column!("size", &SqlType::Integer, non_null = true),
        sqlite_column!("episode_id", &SqlType::Integer),
        sqlite_column!("series_id", &SqlType::Integer),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!("source", &SqlType::Text),
        sqlite_column!("width", &SqlType::Integer),
        sqlite_column!("height", &SqlType::Integer),
        // JSON arrays, one entry per stream
        sqlite_column!("video_codecs", &SqlType::Text),
        sqlite_column!("audio_codecs", &SqlType::Text),
        sqlite_column!("video_bit_depth", &SqlType::Integer),
        sqlite_column!("subtitle_streams", &SqlType::Integer),
        sqlite_column!("group_name", &SqlType::Text),
        sqlite_column!("group_short_name", &SqlType::Text),
        sqlite_column!("is_deprecated", &SqlType::Integer),
        sqlite_column!("version", &SqlType::Integer),
        sqlite_column!("is_chaptered", &SqlType::Integer),
        sqlite_column!("identified_at", &SqlType::Integer),
        sqlite_column!(
            "updated_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[
        ("idx_video_files_hash", "hash"),
        ("idx_video_files_episode_id", "episode_id"),
    ],
    unique_constraints: &[],
};

// =============================================================================
// Creators and series sync marker - Version 2
// =============================================================================

const SERIES_TABLE_V2: Table = Table {
    name: "series",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("episode_count", &SqlType::Integer, non_null = true),
        sqlite_column!("cover_url", &SqlType::Text),
        sqlite_column!("cover_path", &SqlType::Text),
        sqlite_column!(
            "updated_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        // NULL until characters and creators are stored
        sqlite_column!("synced_at", &SqlType::Integer),
    ],
    indices: &[],
    unique_constraints: &[],
};

const CHARACTERS_TABLE_V2: Table = Table {
    name: "characters",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!(
            "series_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "series",
                foreign_column: "id",
                on_delete: ForeignKeyOnChange::Cascade,
            })
        ),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("picture_url", &SqlType::Text),
        sqlite_column!("picture_path", &SqlType::Text),
        sqlite_column!(
            "updated_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!("creator_id", &SqlType::Integer),
    ],
    indices: &[("idx_characters_series_id", "series_id")],
    unique_constraints: &[],
};

const CREATORS_TABLE_V2: Table = Table {
    name: "creators",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("picture_url", &SqlType::Text),
        sqlite_column!("picture_path", &SqlType::Text),
        sqlite_column!(
            "updated_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[],
    unique_constraints: &[],
};

/// Migration from version 1 to version 2: creators table, character voice
/// actors and the series sync marker.
fn migrate_v1_to_v2(conn: &rusqlite::Connection) -> anyhow::Result<()> {
    conn.execute("ALTER TABLE series ADD COLUMN synced_at INTEGER", [])?;
    conn.execute("ALTER TABLE characters ADD COLUMN creator_id INTEGER", [])?;
    CREATORS_TABLE_V2.create(conn)?;
    // Series stored by version 1 always got their characters in the same run
    conn.execute("UPDATE series SET synced_at = updated_at", [])?;
    Ok(())
}

pub const LIBRARY_VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 0,
        tables: &[SERIES_TABLE_V1, CHARACTERS_TABLE_V1, VIDEO_FILES_TABLE_V1],
        migration: None,
    },
    VersionedSchema {
        version: 1,
        tables: &[
            SERIES_TABLE_V2,
            CHARACTERS_TABLE_V2,
            VIDEO_FILES_TABLE_V1,
            CREATORS_TABLE_V2,
        ],
        migration: Some(migrate_v1_to_v2),
    },
];

//! Database schema for commands.db.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};

// =============================================================================
// Command requests - Version 1
// =============================================================================

/// One row per live command. The autoincrement id is the insertion order.
const COMMAND_REQUESTS_TABLE_V1: Table = Table {
    name: "command_requests",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("queue", &SqlType::Text, non_null = true),
        sqlite_column!("command_key", &SqlType::Text, non_null = true),
        sqlite_column!("command_type", &SqlType::Text, non_null = true),
        sqlite_column!("priority", &SqlType::Integer, non_null = true),
        sqlite_column!("params", &SqlType::Text, non_null = true),
        sqlite_column!("updated_at", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_command_requests_queue_priority", "queue, priority, id")],
    unique_constraints: &[&["queue", "command_key"]],
};

pub const COMMANDS_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[COMMAND_REQUESTS_TABLE_V1],
    migration: None,
}];

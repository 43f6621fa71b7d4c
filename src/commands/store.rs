//! Durable storage for pending commands.

use super::models::{Command, CommandPriority, CommandRequest, CommandType, QueueKind};
use super::schema::COMMANDS_VERSIONED_SCHEMAS;
use crate::sqlite_persistence::VersionedSchema;
use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};

/// Trait for command persistence.
///
/// A row exists for every command that has been admitted to a queue and not
/// yet completed or dropped.
pub trait CommandStore: Send + Sync {
    /// Persists a request. Returns the new row id, or None when a command
    /// with the same key is already stored for that queue.
    fn insert(&self, request: &CommandRequest) -> Result<Option<i64>>;

    /// Removes a request by id. Removing a missing row is not an error.
    fn remove(&self, id: i64) -> Result<()>;

    /// Removes several requests in one transaction.
    fn remove_many(&self, ids: &[i64]) -> Result<()>;

    /// All stored requests of a queue, by priority then insertion order.
    fn load_pending(&self, queue: QueueKind) -> Result<Vec<CommandRequest>>;

    fn count(&self, queue: QueueKind) -> Result<usize>;
}

pub struct SqliteCommandStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCommandStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = VersionedSchema::open(COMMANDS_VERSIONED_SCHEMAS, db_path.as_ref(), "commands")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let conn = VersionedSchema::open_in_memory(COMMANDS_VERSIONED_SCHEMAS)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("commands connection mutex poisoned"))
    }
}

impl CommandStore for SqliteCommandStore {
    fn insert(&self, request: &CommandRequest) -> Result<Option<i64>> {
        let params_json =
            serde_json::to_string(&request.command).context("Failed to serialize command")?;
        let conn = self.lock()?;
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO command_requests
                    (queue, command_key, command_type, priority, params, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    request.queue().as_str(),
                    request.key,
                    request.command_type().as_str(),
                    request.priority.as_i32(),
                    params_json,
                    request.updated_at,
                ],
            )
            .with_context(|| format!("Failed to persist command {}", request.key))?;
        if inserted == 0 {
            return Ok(None);
        }
        Ok(Some(conn.last_insert_rowid()))
    }

    fn remove(&self, id: i64) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM command_requests WHERE id = ?1", params![id])
            .with_context(|| format!("Failed to remove command {}", id))?;
        Ok(())
    }

    fn remove_many(&self, ids: &[i64]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare("DELETE FROM command_requests WHERE id = ?1")?;
            for id in ids {
                stmt.execute(params![id])?;
            }
        }
        tx.commit().context("Failed to remove commands")?;
        Ok(())
    }

    fn load_pending(&self, queue: QueueKind) -> Result<Vec<CommandRequest>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, command_key, command_type, priority, params, updated_at
             FROM command_requests
             WHERE queue = ?1
             ORDER BY priority ASC, id ASC",
        )?;
        let rows = stmt
            .query_map(params![queue.as_str()], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i32>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, i64>(5)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        drop(stmt);

        let mut requests = Vec::with_capacity(rows.len());
        let mut unreadable = Vec::new();
        for (id, key, type_str, priority, params_json, updated_at) in rows {
            let command = serde_json::from_str::<Command>(&params_json);
            let priority = CommandPriority::from_i32(priority);
            match (command, priority, CommandType::from_str(&type_str)) {
                (Ok(command), Some(priority), Some(_)) => requests.push(CommandRequest {
                    id,
                    key,
                    command,
                    priority,
                    updated_at,
                }),
                _ => {
                    warn!(
                        "Discarding unreadable {} command {} (type {}): {}",
                        queue, key, type_str, params_json
                    );
                    unreadable.push(id);
                }
            }
        }

        for id in unreadable {
            conn.execute("DELETE FROM command_requests WHERE id = ?1", params![id])?;
        }

        if !requests.is_empty() {
            info!("Loaded {} pending {} commands", requests.len(), queue);
        }
        Ok(requests)
    }

    fn count(&self, queue: QueueKind) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM command_requests WHERE queue = ?1",
            params![queue.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

//! SQLite backed repository with an optional full in-memory cache.

use super::index::{IndexDef, IndexValue, SecondaryIndex};
use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// An entity stored in one table, keyed by an integer id.
pub trait StoredEntity: Clone + Send + Sync + 'static {
    const TABLE: &'static str;
    /// Select list, matching what `from_row` reads.
    const COLUMNS: &'static str;

    fn id(&self) -> i64;
    fn set_id(&mut self, id: i64);
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
    /// Inserts or updates the row, returning its id.
    fn upsert(&self, conn: &Connection) -> rusqlite::Result<i64>;
}

struct CacheState<E> {
    entities: HashMap<i64, E>,
    indexes: Vec<SecondaryIndex<E>>,
}

impl<E: StoredEntity> CacheState<E> {
    fn insert(&mut self, entity: E) {
        let id = entity.id();
        if let Some(old) = self.entities.remove(&id) {
            for index in &mut self.indexes {
                index.remove(&old, id);
            }
        }
        for index in &mut self.indexes {
            index.insert(&entity, id);
        }
        self.entities.insert(id, entity);
    }

    fn remove(&mut self, id: i64) {
        if let Some(old) = self.entities.remove(&id) {
            for index in &mut self.indexes {
                index.remove(&old, id);
            }
        }
    }

    fn clear(&mut self) {
        self.entities.clear();
        for index in &mut self.indexes {
            index.clear();
        }
    }
}

/// Repository over one table.
///
/// When cached, every row is held in memory together with the secondary
/// indexes, and reads never touch the database. Writes go to the database
/// first and are applied to the cache only once they succeed. Reads share
/// the state lock, writes and rebuilds hold it exclusively.
pub struct CachedRepository<E: StoredEntity> {
    conn: Arc<Mutex<Connection>>,
    cached: bool,
    state: RwLock<CacheState<E>>,
}

impl<E: StoredEntity> CachedRepository<E> {
    pub fn new(conn: Arc<Mutex<Connection>>, indexes: &[IndexDef<E>], cached: bool) -> Result<Self> {
        let repository = Self {
            conn,
            cached,
            state: RwLock::new(CacheState {
                entities: HashMap::new(),
                indexes: indexes.iter().copied().map(SecondaryIndex::new).collect(),
            }),
        };
        if cached {
            repository.rebuild()?;
        }
        Ok(repository)
    }

    /// Reloads the cache and indexes with a single table scan. Returns the
    /// number of rows loaded.
    pub fn rebuild(&self) -> Result<usize> {
        let mut state = self.write_state()?;
        if !self.cached {
            return Ok(0);
        }
        let rows = {
            let conn = self.lock_conn()?;
            Self::query(&conn, &format!("SELECT {} FROM {}", E::COLUMNS, E::TABLE), [])?
        };
        state.clear();
        let count = rows.len();
        for entity in rows {
            state.insert(entity);
        }
        debug!("Rebuilt cache for {} with {} rows", E::TABLE, count);
        Ok(count)
    }

    pub fn get_by_id(&self, id: i64) -> Result<Option<E>> {
        let state = self.read_state()?;
        if self.cached {
            return Ok(state.entities.get(&id).cloned());
        }
        let conn = self.lock_conn()?;
        conn.query_row(
            &format!("SELECT {} FROM {} WHERE id = ?1", E::COLUMNS, E::TABLE),
            params![id],
            |row| E::from_row(row),
        )
        .optional()
        .with_context(|| format!("Failed to read {} row {}", E::TABLE, id))
    }

    /// All rows, ordered by id.
    pub fn get_all(&self) -> Result<Vec<E>> {
        let state = self.read_state()?;
        if self.cached {
            let mut all: Vec<E> = state.entities.values().cloned().collect();
            all.sort_by_key(|e| e.id());
            return Ok(all);
        }
        let conn = self.lock_conn()?;
        Self::query(
            &conn,
            &format!("SELECT {} FROM {} ORDER BY id", E::COLUMNS, E::TABLE),
            [],
        )
    }

    /// Rows whose projected value for `index` equals `value`, ordered by id.
    pub fn get_by_index(&self, index: &str, value: impl Into<IndexValue>) -> Result<Vec<E>> {
        let value = value.into();
        let state = self.read_state()?;
        let secondary = state
            .indexes
            .iter()
            .find(|i| i.def.name == index)
            .ok_or_else(|| anyhow!("Unknown index '{}' on {}", index, E::TABLE))?;

        if self.cached {
            return Ok(secondary
                .get(&value)
                .into_iter()
                .filter_map(|id| state.entities.get(&id).cloned())
                .collect());
        }

        let conn = self.lock_conn()?;
        Self::query(
            &conn,
            &format!(
                "SELECT {} FROM {} WHERE {} = ?1 ORDER BY id",
                E::COLUMNS,
                E::TABLE,
                secondary.def.column
            ),
            params![value],
        )
    }

    /// Writes the entity through to the database, then refreshes the cache.
    /// New entities (id 0) receive their assigned id.
    pub fn save(&self, entity: &mut E) -> Result<()> {
        let mut state = self.write_state()?;
        let id = {
            let conn = self.lock_conn()?;
            entity
                .upsert(&conn)
                .with_context(|| format!("Failed to save {} row", E::TABLE))?
        };
        entity.set_id(id);
        if self.cached {
            state.insert(entity.clone());
        }
        Ok(())
    }

    /// Deletes a row. Returns false when it did not exist.
    pub fn delete(&self, id: i64) -> Result<bool> {
        let mut state = self.write_state()?;
        let deleted = {
            let conn = self.lock_conn()?;
            conn.execute(&format!("DELETE FROM {} WHERE id = ?1", E::TABLE), params![id])
                .with_context(|| format!("Failed to delete {} row {}", E::TABLE, id))?
        };
        if self.cached {
            state.remove(id);
        }
        Ok(deleted > 0)
    }

    pub fn count(&self) -> Result<usize> {
        let state = self.read_state()?;
        if self.cached {
            return Ok(state.entities.len());
        }
        let conn = self.lock_conn()?;
        let count: i64 =
            conn.query_row(&format!("SELECT COUNT(*) FROM {}", E::TABLE), [], |r| r.get(0))?;
        Ok(count as usize)
    }

    fn query<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<E>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, |row| E::from_row(row))?
            .collect::<rusqlite::Result<Vec<E>>>()
            .with_context(|| format!("Failed to read {} rows", E::TABLE))?;
        Ok(rows)
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("{} connection mutex poisoned", E::TABLE))
    }

    fn read_state(&self) -> Result<RwLockReadGuard<'_, CacheState<E>>> {
        self.state
            .read()
            .map_err(|_| anyhow!("{} cache lock poisoned", E::TABLE))
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, CacheState<E>>> {
        self.state
            .write()
            .map_err(|_| anyhow!("{} cache lock poisoned", E::TABLE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite_column;
    use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};

    #[derive(Debug, Clone, PartialEq)]
    struct Note {
        id: i64,
        topic: String,
        body: String,
    }

    impl StoredEntity for Note {
        const TABLE: &'static str = "notes";
        const COLUMNS: &'static str = "id, topic, body";

        fn id(&self) -> i64 {
            self.id
        }

        fn set_id(&mut self, id: i64) {
            self.id = id;
        }

        fn from_row(row: &Row) -> rusqlite::Result<Self> {
            Ok(Note {
                id: row.get(0)?,
                topic: row.get(1)?,
                body: row.get(2)?,
            })
        }

        fn upsert(&self, conn: &Connection) -> rusqlite::Result<i64> {
            if self.id == 0 {
                conn.execute(
                    "INSERT INTO notes (topic, body) VALUES (?1, ?2)",
                    params![self.topic, self.body],
                )?;
                Ok(conn.last_insert_rowid())
            } else {
                conn.execute(
                    "INSERT INTO notes (id, topic, body) VALUES (?1, ?2, ?3)
                     ON CONFLICT(id) DO UPDATE SET topic = excluded.topic, body = excluded.body",
                    params![self.id, self.topic, self.body],
                )?;
                Ok(self.id)
            }
        }
    }

    const NOTES_TABLE: Table = Table {
        name: "notes",
        columns: &[
            sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
            sqlite_column!("topic", &SqlType::Text, non_null = true),
            sqlite_column!("body", &SqlType::Text, non_null = true),
        ],
        indices: &[("idx_notes_topic", "topic")],
        unique_constraints: &[],
    };

    const SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
        version: 0,
        tables: &[NOTES_TABLE],
        migration: None,
    }];

    fn note_topic(note: &Note) -> Option<IndexValue> {
        Some(IndexValue::Text(note.topic.clone()))
    }

    const TOPIC_INDEX: IndexDef<Note> = IndexDef {
        name: "topic",
        column: "topic",
        project: note_topic,
    };

    fn note(topic: &str, body: &str) -> Note {
        Note {
            id: 0,
            topic: topic.to_string(),
            body: body.to_string(),
        }
    }

    fn connection() -> Arc<Mutex<Connection>> {
        Arc::new(Mutex::new(VersionedSchema::open_in_memory(SCHEMAS).unwrap()))
    }

    fn exercise(repo: &CachedRepository<Note>) {
        let mut a = note("rust", "ownership");
        let mut b = note("rust", "lifetimes");
        let mut c = note("sql", "joins");
        repo.save(&mut a).unwrap();
        repo.save(&mut b).unwrap();
        repo.save(&mut c).unwrap();
        assert!(a.id > 0 && b.id > a.id && c.id > b.id);

        let rust = repo.get_by_index("topic", "rust").unwrap();
        assert_eq!(rust, vec![a.clone(), b.clone()]);

        // Moving an entity to another key drops the stale index entry
        b.topic = "sql".to_string();
        repo.save(&mut b).unwrap();
        assert_eq!(repo.get_by_index("topic", "rust").unwrap(), vec![a.clone()]);
        assert_eq!(
            repo.get_by_index("topic", "sql").unwrap(),
            vec![b.clone(), c.clone()]
        );

        assert!(repo.delete(c.id).unwrap());
        assert!(!repo.delete(c.id).unwrap());
        assert_eq!(repo.get_by_id(c.id).unwrap(), None);
        assert_eq!(repo.get_by_index("topic", "sql").unwrap(), vec![b.clone()]);
        assert_eq!(repo.get_all().unwrap(), vec![a, b]);
        assert_eq!(repo.count().unwrap(), 2);
    }

    #[test]
    fn test_cached_repository_operations() {
        let repo = CachedRepository::new(connection(), &[TOPIC_INDEX], true).unwrap();
        exercise(&repo);
    }

    #[test]
    fn test_uncached_repository_operations() {
        let repo = CachedRepository::new(connection(), &[TOPIC_INDEX], false).unwrap();
        exercise(&repo);
    }

    #[test]
    fn test_rebuild_picks_up_external_writes() {
        let conn = connection();
        let repo = CachedRepository::new(conn.clone(), &[TOPIC_INDEX], true).unwrap();

        conn.lock()
            .unwrap()
            .execute(
                "INSERT INTO notes (topic, body) VALUES ('rust', 'traits')",
                [],
            )
            .unwrap();
        assert!(repo.get_by_index("topic", "rust").unwrap().is_empty());

        assert_eq!(repo.rebuild().unwrap(), 1);
        let rust = repo.get_by_index("topic", "rust").unwrap();
        assert_eq!(rust.len(), 1);
        assert_eq!(rust[0].body, "traits");
    }

    #[test]
    fn test_existing_rows_loaded_on_creation() {
        let conn = connection();
        {
            let repo = CachedRepository::new(conn.clone(), &[TOPIC_INDEX], false).unwrap();
            repo.save(&mut note("rust", "macros")).unwrap();
        }
        let repo = CachedRepository::new(conn, &[TOPIC_INDEX], true).unwrap();
        assert_eq!(repo.count().unwrap(), 1);
        assert_eq!(repo.get_by_index("topic", "rust").unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_index_is_an_error() {
        let repo = CachedRepository::new(connection(), &[TOPIC_INDEX], true).unwrap();
        assert!(repo.get_by_index("missing", 1).is_err());
    }

    #[test]
    fn test_failed_write_leaves_cache_untouched() {
        let conn = connection();
        let repo = CachedRepository::new(conn.clone(), &[TOPIC_INDEX], true).unwrap();
        let mut a = note("rust", "ownership");
        repo.save(&mut a).unwrap();

        conn.lock().unwrap().execute("DROP TABLE notes", []).unwrap();
        let mut changed = a.clone();
        changed.topic = "sql".to_string();
        assert!(repo.save(&mut changed).is_err());

        assert_eq!(repo.get_by_id(a.id).unwrap(), Some(a));
        assert!(repo.get_by_index("topic", "sql").unwrap().is_empty());
    }
}

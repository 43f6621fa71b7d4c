use rusqlite::types::{ToSql, ToSqlOutput};
use std::collections::{BTreeSet, HashMap};

/// Value a secondary index is keyed on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndexValue {
    Int(i64),
    Text(String),
}

impl From<i64> for IndexValue {
    fn from(value: i64) -> Self {
        IndexValue::Int(value)
    }
}

impl From<&str> for IndexValue {
    fn from(value: &str) -> Self {
        IndexValue::Text(value.to_string())
    }
}

impl From<String> for IndexValue {
    fn from(value: String) -> Self {
        IndexValue::Text(value)
    }
}

impl ToSql for IndexValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            IndexValue::Int(v) => v.to_sql(),
            IndexValue::Text(v) => v.to_sql(),
        }
    }
}

/// Declares a non-unique secondary index over a projected field.
///
/// `column` is the table column holding the same value, used when the
/// repository is not cached.
pub struct IndexDef<E> {
    pub name: &'static str,
    pub column: &'static str,
    pub project: fn(&E) -> Option<IndexValue>,
}

impl<E> Clone for IndexDef<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for IndexDef<E> {}

pub(super) struct SecondaryIndex<E> {
    pub(super) def: IndexDef<E>,
    entries: HashMap<IndexValue, BTreeSet<i64>>,
}

impl<E> SecondaryIndex<E> {
    pub(super) fn new(def: IndexDef<E>) -> Self {
        Self {
            def,
            entries: HashMap::new(),
        }
    }

    pub(super) fn insert(&mut self, entity: &E, id: i64) {
        if let Some(value) = (self.def.project)(entity) {
            self.entries.entry(value).or_default().insert(id);
        }
    }

    pub(super) fn remove(&mut self, entity: &E, id: i64) {
        if let Some(value) = (self.def.project)(entity) {
            if let Some(ids) = self.entries.get_mut(&value) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.entries.remove(&value);
                }
            }
        }
    }

    pub(super) fn get(&self, value: &IndexValue) -> Vec<i64> {
        self.entries
            .get(value)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    pub(super) fn clear(&mut self) {
        self.entries.clear();
    }
}

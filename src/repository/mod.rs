//! Generic table repository with an optional in-memory cache and
//! secondary indexes.

mod cached;
mod index;

pub use cached::{CachedRepository, StoredEntity};
pub use index::{IndexDef, IndexValue};

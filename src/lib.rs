//! Media Librarian Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod commands;
pub mod config;
pub mod fetcher;
pub mod library;
pub mod metadata;
pub mod quality;
pub mod rate_limiter;
pub mod repository;
pub mod sqlite_persistence;

// Re-export commonly used types for convenience
pub use commands::{Command, CommandContext, QueueKind, QueueSet, SqliteCommandStore};
pub use library::LibraryStore;
pub use quality::{QualityFilter, QualityPolicy};
pub use rate_limiter::{RateLimiter, RateLimiterConfig};

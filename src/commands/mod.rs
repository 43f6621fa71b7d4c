//! Durable background command queues.
//!
//! Commands are persisted in `commands.db` before they enter a queue and
//! removed once their handler returns, so whatever was pending at shutdown
//! (or crash) runs again on the next start. Each queue is drained by a
//! single worker; the three queues run in parallel.

mod context;
mod handlers;
mod models;
mod queue;
mod schema;
mod store;
mod worker;

#[cfg(test)]
pub(crate) mod test_support;

pub use context::{CommandContext, HandlerSettings};
pub use handlers::{execute, hash_file_content};
pub use models::{
    Command, CommandOutcome, CommandPriority, CommandRequest, CommandType, QueueKind, QueueStatus,
};
pub use queue::{CommandQueue, QueueSet};
pub use store::{CommandStore, SqliteCommandStore};
pub use worker::{spawn_workers, QueueWorker};

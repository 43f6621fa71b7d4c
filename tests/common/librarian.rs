//! Librarian lifecycle management
//!
//! A [`TestEnv`] owns the temp directories and the fakes, so a librarian can
//! be opened, dropped and opened again on the same databases to simulate a
//! restart.

use super::fakes::{FakeMetadata, FakeTransport};
use media_librarian::commands::{
    spawn_workers, CommandContext, CommandStore, HandlerSettings, QueueSet, SqliteCommandStore,
};
use media_librarian::fetcher::ArtifactFetcher;
use media_librarian::library::LibraryStore;
use media_librarian::quality::QualityFilter;
use media_librarian::rate_limiter::{RateLimiter, RateLimiterConfig};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct TestEnv {
    pub db_dir: TempDir,
    pub media_dir: TempDir,
    pub metadata: Arc<FakeMetadata>,
    pub transport: Arc<FakeTransport>,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            db_dir: TempDir::new().unwrap(),
            media_dir: TempDir::new().unwrap(),
            metadata: Arc::new(FakeMetadata::default()),
            transport: Arc::new(FakeTransport::default()),
        }
    }

    /// Opens the databases and rebuilds the queues from what they hold.
    pub fn open(&self) -> Librarian {
        let db_dir = self.db_dir.path();
        let library = Arc::new(LibraryStore::new(&db_dir.join("library.db"), true).unwrap());
        let store: Arc<dyn CommandStore> =
            Arc::new(SqliteCommandStore::new(db_dir.join("commands.db")).unwrap());
        let queues = Arc::new(QueueSet::load(store.clone()).unwrap());

        let fast = RateLimiterConfig::new(Duration::from_millis(1));
        let images_dir = db_dir.join("images");
        let fetcher = ArtifactFetcher::new(
            self.transport.clone(),
            Arc::new(RateLimiter::new("images", fast)),
            images_dir.join(".tmp"),
            Duration::from_millis(1),
        );
        let mut settings = HandlerSettings::new(images_dir);
        settings.image_max_attempts = 2;

        let ctx = CommandContext {
            library: library.clone(),
            api_limiter: Arc::new(RateLimiter::new("api", fast)),
            metadata: self.metadata.clone(),
            fetcher: Arc::new(fetcher),
            quality: Arc::new(QualityFilter::default()),
            queues: queues.clone(),
            settings,
        };

        Librarian {
            library,
            queues,
            store,
            ctx,
        }
    }
}

pub struct Librarian {
    pub library: Arc<LibraryStore>,
    pub queues: Arc<QueueSet>,
    pub store: Arc<dyn CommandStore>,
    pub ctx: CommandContext,
}

impl Librarian {
    pub fn start(&self) -> RunningLibrarian {
        let cancel = CancellationToken::new();
        let workers = spawn_workers(&self.queues, self.ctx.clone(), cancel.clone());
        RunningLibrarian { cancel, workers }
    }

    /// True when no queue has pending or running work.
    pub fn is_idle(&self) -> bool {
        self.queues
            .status()
            .iter()
            .all(|s| s.pending == 0 && s.current.is_none())
    }
}

pub struct RunningLibrarian {
    cancel: CancellationToken,
    workers: Vec<JoinHandle<()>>,
}

impl RunningLibrarian {
    /// Cancels the workers and waits for in-flight commands.
    pub async fn stop(self) {
        self.cancel.cancel();
        for worker in self.workers {
            worker.await.unwrap();
        }
    }
}

/// Polls `condition` for up to five seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

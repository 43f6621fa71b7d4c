//! In-memory priority queue backed by the command store.

use super::models::{
    Command, CommandPriority, CommandRequest, CommandType, QueueKind, QueueStatus,
};
use super::store::CommandStore;
use anyhow::{anyhow, bail, Result};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Heap entry ordered so that the max element is the next command to run:
/// lowest priority value first, then lowest id.
struct PendingEntry(CommandRequest);

impl PartialEq for PendingEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PendingEntry {}

impl PartialOrd for PendingEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        (other.0.priority, other.0.id).cmp(&(self.0.priority, self.0.id))
    }
}

struct QueueState {
    pending: BinaryHeap<PendingEntry>,
    /// Keys of pending commands plus the one being executed.
    keys: HashSet<String>,
    paused: bool,
    current: Option<String>,
}

/// A named, durable, priority-ordered command queue.
///
/// Every admitted command is persisted before it becomes visible in memory,
/// and removed from the store in the same critical section that forgets it.
pub struct CommandQueue {
    kind: QueueKind,
    store: Arc<dyn CommandStore>,
    state: Mutex<QueueState>,
    notify: Notify,
}

impl CommandQueue {
    /// Creates the queue and reloads whatever the store still holds for it.
    pub fn load(kind: QueueKind, store: Arc<dyn CommandStore>) -> Result<Self> {
        let restored = store.load_pending(kind)?;
        let keys = restored.iter().map(|r| r.key.clone()).collect();
        let pending = restored.into_iter().map(PendingEntry).collect();
        Ok(Self {
            kind,
            store,
            state: Mutex::new(QueueState {
                pending,
                keys,
                paused: false,
                current: None,
            }),
            notify: Notify::new(),
        })
    }

    pub fn kind(&self) -> QueueKind {
        self.kind
    }

    /// Enqueues a command at its default priority. Returns false when an
    /// equivalent command is already pending or running.
    pub fn enqueue(&self, command: Command) -> Result<bool> {
        self.enqueue_request(CommandRequest::new(command))
    }

    pub fn enqueue_with_priority(&self, command: Command, priority: CommandPriority) -> Result<bool> {
        self.enqueue_request(CommandRequest::with_priority(command, priority))
    }

    pub fn enqueue_request(&self, mut request: CommandRequest) -> Result<bool> {
        if request.queue() != self.kind {
            bail!(
                "{} command {} routed to the {} queue",
                request.queue(),
                request.key,
                self.kind
            );
        }

        let mut state = self.lock()?;
        if state.keys.contains(&request.key) {
            debug!("Command {} already queued, skipping", request.key);
            return Ok(false);
        }
        let Some(id) = self.store.insert(&request)? else {
            debug!("Command {} already stored, skipping", request.key);
            return Ok(false);
        };
        request.id = id;
        state.keys.insert(request.key.clone());
        state.pending.push(PendingEntry(request));
        drop(state);

        self.notify.notify_one();
        Ok(true)
    }

    /// Pops the next command unless the queue is paused or empty, and marks
    /// it as the one being executed.
    pub fn try_next(&self) -> Result<Option<CommandRequest>> {
        let mut state = self.lock()?;
        if state.paused {
            return Ok(None);
        }
        let Some(PendingEntry(request)) = state.pending.pop() else {
            return Ok(None);
        };
        state.current = Some(request.command.describe());
        Ok(Some(request))
    }

    /// Waits for the next runnable command. Returns None once `cancel` fires.
    pub async fn next(&self, cancel: &CancellationToken) -> Result<Option<CommandRequest>> {
        loop {
            if cancel.is_cancelled() {
                return Ok(None);
            }
            if let Some(request) = self.try_next()? {
                return Ok(Some(request));
            }
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = cancel.cancelled() => return Ok(None),
            }
        }
    }

    /// Deletes a finished command's row, then forgets it. When the row cannot
    /// be deleted the command goes back to pending so memory keeps matching
    /// storage.
    pub fn complete(&self, request: &CommandRequest) -> Result<()> {
        let mut state = self.lock()?;
        state.current = None;
        if let Err(e) = self.store.remove(request.id) {
            state.pending.push(PendingEntry(request.clone()));
            drop(state);
            self.notify.notify_one();
            return Err(e);
        }
        state.keys.remove(&request.key);
        Ok(())
    }

    /// Puts a command back at its original position. Its row is untouched.
    pub fn defer(&self, request: CommandRequest) -> Result<()> {
        let mut state = self.lock()?;
        state.current = None;
        state.pending.push(PendingEntry(request));
        drop(state);
        self.notify.notify_one();
        Ok(())
    }

    /// Stops handing out commands. The running command is not interrupted.
    pub fn pause(&self) -> Result<()> {
        self.lock()?.paused = true;
        info!("Queue {} paused", self.kind);
        Ok(())
    }

    pub fn resume(&self) -> Result<()> {
        self.lock()?.paused = false;
        info!("Queue {} resumed", self.kind);
        self.notify.notify_one();
        Ok(())
    }

    pub fn is_paused(&self) -> bool {
        self.lock().map(|s| s.paused).unwrap_or(false)
    }

    /// Drops pending commands of the given types from memory and storage.
    /// The running command is never affected. Returns how many were removed.
    pub fn clear_by_type(&self, types: &[CommandType]) -> Result<usize> {
        let mut state = self.lock()?;
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut state.pending)
            .into_vec()
            .into_iter()
            .partition(|entry| types.contains(&entry.0.command_type()));

        let ids: Vec<i64> = removed.iter().map(|e| e.0.id).collect();
        if let Err(e) = self.store.remove_many(&ids) {
            state.pending = kept.into_iter().chain(removed).collect();
            return Err(e);
        }

        for entry in &removed {
            state.keys.remove(&entry.0.key);
        }
        state.pending = kept.into_iter().collect();
        if !removed.is_empty() {
            info!("Cleared {} commands from queue {}", removed.len(), self.kind);
        }
        Ok(removed.len())
    }

    /// Number of commands waiting to start.
    pub fn queue_count(&self) -> usize {
        self.lock().map(|s| s.pending.len()).unwrap_or(0)
    }

    pub fn status(&self) -> QueueStatus {
        match self.lock() {
            Ok(state) => QueueStatus {
                queue: self.kind,
                paused: state.paused,
                pending: state.pending.len(),
                current: state.current.clone(),
            },
            Err(_) => QueueStatus {
                queue: self.kind,
                paused: false,
                pending: 0,
                current: None,
            },
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, QueueState>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("{} queue state mutex poisoned", self.kind))
    }
}

/// The three queues of the application.
pub struct QueueSet {
    pub general: Arc<CommandQueue>,
    pub hasher: Arc<CommandQueue>,
    pub images: Arc<CommandQueue>,
}

impl QueueSet {
    pub fn load(store: Arc<dyn CommandStore>) -> Result<Self> {
        Ok(Self {
            general: Arc::new(CommandQueue::load(QueueKind::General, store.clone())?),
            hasher: Arc::new(CommandQueue::load(QueueKind::Hasher, store.clone())?),
            images: Arc::new(CommandQueue::load(QueueKind::Images, store)?),
        })
    }

    pub fn get(&self, kind: QueueKind) -> &Arc<CommandQueue> {
        match kind {
            QueueKind::General => &self.general,
            QueueKind::Hasher => &self.hasher,
            QueueKind::Images => &self.images,
        }
    }

    /// Routes a command to its queue.
    pub fn enqueue(&self, command: Command) -> Result<bool> {
        self.get(command.queue()).enqueue(command)
    }

    pub fn all(&self) -> [&Arc<CommandQueue>; 3] {
        [&self.general, &self.hasher, &self.images]
    }

    pub fn status(&self) -> Vec<QueueStatus> {
        self.all().iter().map(|q| q.status()).collect()
    }
}

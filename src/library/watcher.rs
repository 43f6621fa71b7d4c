//! Turns file-system events and import folder scans into hash commands.

use crate::commands::{Command, QueueSet};
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

pub const DEFAULT_VIDEO_EXTENSIONS: &[&str] = &[
    "mkv", "mp4", "avi", "ogm", "wmv", "mov", "m4v", "webm", "ts", "flv", "mpg", "mpeg",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEventKind {
    Created,
    Renamed,
    Modified,
    Removed,
}

/// A change reported by whatever watches the import folders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub path: PathBuf,
    pub kind: FileEventKind,
}

impl FileEvent {
    pub fn new(path: impl Into<PathBuf>, kind: FileEventKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Case-insensitive extension check. `extensions` are lowercase, without dot.
pub fn is_video_file(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .is_some_and(|e| extensions.iter().any(|x| *x == e))
}

/// Video files below `dir`, sorted by path.
pub fn collect_video_files(dir: &Path, extensions: &[String]) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping unreadable entry under {:?}: {}", dir, e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| is_video_file(path, extensions))
        .collect();
    files.sort();
    files
}

fn enqueue_hash(queues: &QueueSet, path: PathBuf) -> Result<bool> {
    queues.enqueue(Command::HashFile { path, force: false })
}

/// Applies one event. Returns how many hash commands were admitted.
pub fn handle_event(event: &FileEvent, queues: &QueueSet, extensions: &[String]) -> Result<usize> {
    match event.kind {
        FileEventKind::Created | FileEventKind::Renamed => {
            if event.path.is_dir() {
                let mut admitted = 0;
                for path in collect_video_files(&event.path, extensions) {
                    if enqueue_hash(queues, path)? {
                        admitted += 1;
                    }
                }
                Ok(admitted)
            } else if is_video_file(&event.path, extensions) {
                Ok(enqueue_hash(queues, event.path.clone())? as usize)
            } else {
                debug!("Ignoring non-video file {:?}", event.path);
                Ok(0)
            }
        }
        FileEventKind::Modified => Ok(0),
        FileEventKind::Removed => {
            debug!("File removed: {:?}", event.path);
            Ok(0)
        }
    }
}

/// Enqueues every video file found in the import folders.
pub fn scan_import_folders(
    folders: &[PathBuf],
    queues: &QueueSet,
    extensions: &[String],
) -> Result<usize> {
    let mut admitted = 0;
    for folder in folders {
        if !folder.is_dir() {
            warn!("Import folder {:?} is not a directory, skipping", folder);
            continue;
        }
        let event = FileEvent::new(folder.clone(), FileEventKind::Created);
        let count = handle_event(&event, queues, extensions)?;
        info!("Import scan of {:?} queued {} files", folder, count);
        admitted += count;
    }
    Ok(admitted)
}

/// Consumes file events until the channel closes or `cancel` fires.
/// Directory walks run on the blocking pool.
pub async fn run_event_loop(
    mut events: mpsc::Receiver<FileEvent>,
    queues: Arc<QueueSet>,
    extensions: Arc<Vec<String>>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
            _ = cancel.cancelled() => break,
        };

        let queues = queues.clone();
        let extensions = extensions.clone();
        let path = event.path.clone();
        let result =
            tokio::task::spawn_blocking(move || handle_event(&event, &queues, &extensions)).await;
        match result {
            Ok(Ok(count)) if count > 0 => debug!("Queued {} files from {:?}", count, path),
            Ok(Ok(_)) => {}
            Ok(Err(e)) => error!("Failed to handle file event for {:?}: {:#}", path, e),
            Err(e) => error!("File event handler for {:?} panicked: {}", path, e),
        }
    }
    debug!("File event loop stopped");
}

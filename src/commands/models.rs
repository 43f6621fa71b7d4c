//! Command data types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Named command queue. Each queue has its own ordering, pause flag and
/// worker, and never shares deduplication keys with another queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueueKind {
    General,
    Hasher,
    Images,
}

impl QueueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueKind::General => "general",
            QueueKind::Hasher => "hasher",
            QueueKind::Images => "images",
        }
    }
}

impl fmt::Display for QueueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Priority levels for commands.
/// Lower numeric value = higher priority (processed first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CommandPriority {
    Urgent = 1,
    High = 2,
    Normal = 3,
    Low = 4,
    Background = 5,
}

impl CommandPriority {
    pub fn as_i32(&self) -> i32 {
        *self as i32
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            1 => Some(CommandPriority::Urgent),
            2 => Some(CommandPriority::High),
            3 => Some(CommandPriority::Normal),
            4 => Some(CommandPriority::Low),
            5 => Some(CommandPriority::Background),
            _ => None,
        }
    }
}

/// Closed set of command kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandType {
    HashFile,
    ProcessFile,
    GetSeries,
    DownloadSeriesImages,
}

impl CommandType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandType::HashFile => "HashFile",
            CommandType::ProcessFile => "ProcessFile",
            CommandType::GetSeries => "GetSeries",
            CommandType::DownloadSeriesImages => "DownloadSeriesImages",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "HashFile" => Some(CommandType::HashFile),
            "ProcessFile" => Some(CommandType::ProcessFile),
            "GetSeries" => Some(CommandType::GetSeries),
            "DownloadSeriesImages" => Some(CommandType::DownloadSeriesImages),
            _ => None,
        }
    }
}

/// A unit of background work. Serialized as-is into the command store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Command {
    /// Hash a file on disk and register it in the library.
    HashFile { path: PathBuf, force: bool },
    /// Identify a registered file and apply the retention policy.
    ProcessFile { file_id: i64, force_refresh: bool },
    /// Fetch series data and its characters.
    GetSeries { series_id: i64, force_refresh: bool },
    /// Download the cover and character pictures of a series.
    DownloadSeriesImages { series_id: i64, force: bool },
}

impl Command {
    pub fn command_type(&self) -> CommandType {
        match self {
            Command::HashFile { .. } => CommandType::HashFile,
            Command::ProcessFile { .. } => CommandType::ProcessFile,
            Command::GetSeries { .. } => CommandType::GetSeries,
            Command::DownloadSeriesImages { .. } => CommandType::DownloadSeriesImages,
        }
    }

    pub fn queue(&self) -> QueueKind {
        match self {
            Command::HashFile { .. } => QueueKind::Hasher,
            Command::ProcessFile { .. } | Command::GetSeries { .. } => QueueKind::General,
            Command::DownloadSeriesImages { .. } => QueueKind::Images,
        }
    }

    pub fn default_priority(&self) -> CommandPriority {
        match self {
            Command::HashFile { .. } => CommandPriority::High,
            Command::ProcessFile { .. } => CommandPriority::Normal,
            Command::GetSeries { .. } => CommandPriority::High,
            Command::DownloadSeriesImages { .. } => CommandPriority::Low,
        }
    }

    /// Deduplication key. Two commands with the same key in the same queue
    /// describe the same work.
    pub fn key(&self) -> String {
        match self {
            Command::HashFile { path, .. } => format!("HashFile_{}", path.display()),
            Command::ProcessFile { file_id, .. } => format!("ProcessFile_{}", file_id),
            Command::GetSeries { series_id, .. } => format!("GetSeries_{}", series_id),
            Command::DownloadSeriesImages { series_id, force } => {
                format!("DownloadSeriesImages_{}_{}", series_id, force)
            }
        }
    }

    /// Human readable activity line for status reporting.
    pub fn describe(&self) -> String {
        match self {
            Command::HashFile { path, .. } => format!("Hashing file {}", path.display()),
            Command::ProcessFile { file_id, .. } => format!("Processing file {}", file_id),
            Command::GetSeries { series_id, .. } => {
                format!("Getting series info for {}", series_id)
            }
            Command::DownloadSeriesImages { series_id, .. } => {
                format!("Downloading images for series {}", series_id)
            }
        }
    }
}

/// A command as held by a queue: the command plus its bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    /// Row id in the command store, assigned on insert. Doubles as the
    /// insertion order within a priority level.
    pub id: i64,
    pub key: String,
    pub command: Command,
    pub priority: CommandPriority,
    pub updated_at: i64,
}

impl CommandRequest {
    pub fn new(command: Command) -> Self {
        let priority = command.default_priority();
        Self::with_priority(command, priority)
    }

    pub fn with_priority(command: Command, priority: CommandPriority) -> Self {
        Self {
            id: 0,
            key: command.key(),
            command,
            priority,
            updated_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn queue(&self) -> QueueKind {
        self.command.queue()
    }

    pub fn command_type(&self) -> CommandType {
        self.command.command_type()
    }
}

/// What a handler tells the worker once it returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Work done, drop the command.
    Completed,
    /// Keep the command and run it again later from its original position.
    Deferred,
}

/// Snapshot of a queue for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub queue: QueueKind,
    pub paused: bool,
    pub pending: usize,
    pub current: Option<String>,
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.paused { "paused" } else { "running" };
        write!(f, "[{}] {}, {} pending", self.queue, state, self.pending)?;
        if let Some(current) = &self.current {
            write!(f, ", current: {}", current)?;
        }
        Ok(())
    }
}

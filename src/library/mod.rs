//! The local media library: files, series, characters and creators.

mod models;
mod schema;
mod store;
mod watcher;

pub use models::{
    Character, Creator, FileMediaInfo, FileStatus, ReleaseGroup, Series, VideoFile,
};
pub use store::{
    LibraryStore, CHARACTERS_BY_SERIES, VIDEO_FILES_BY_EPISODE, VIDEO_FILES_BY_HASH,
    VIDEO_FILES_BY_PATH,
};
pub use watcher::{
    collect_video_files, handle_event, is_video_file, run_event_loop, scan_import_folders,
    FileEvent, FileEventKind, DEFAULT_VIDEO_EXTENSIONS,
};

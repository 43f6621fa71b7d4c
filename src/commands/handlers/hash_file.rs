use crate::commands::{Command, CommandContext, CommandOutcome};
use crate::library::{is_video_file, VideoFile};
use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Hex SHA-256 of a file's content.
pub fn hash_file_content(path: &Path) -> Result<String> {
    let mut file =
        std::fs::File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let read = file
            .read(&mut buffer)
            .with_context(|| format!("Failed to read {:?}", path))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

pub(super) async fn run(path: PathBuf, force: bool, ctx: &CommandContext) -> Result<CommandOutcome> {
    let metadata = match tokio::fs::metadata(&path).await {
        Ok(m) if m.is_file() => m,
        _ => {
            info!("File {:?} no longer exists, skipping", path);
            return Ok(CommandOutcome::Completed);
        }
    };
    if !is_video_file(&path, &ctx.settings.video_extensions) {
        debug!("{:?} is not a video file, skipping", path);
        return Ok(CommandOutcome::Completed);
    }
    let size = metadata.len();

    let by_path = ctx.library.file_by_path(&path)?;
    let known = by_path
        .as_ref()
        .filter(|f| !force && f.size == size && !f.hash.is_empty())
        .cloned();

    let file = match known {
        Some(file) => {
            debug!("{:?} already hashed", path);
            file
        }
        None => {
            let hash_path = path.clone();
            let hash = tokio::task::spawn_blocking(move || hash_file_content(&hash_path))
                .await
                .context("Hashing task failed")??;
            debug!("Hashed {:?}: {}", path, hash);

            // A file moved between folders keeps its record and metadata
            let mut file = match ctx.library.file_by_hash(&hash)? {
                Some(existing) if existing.size == size => {
                    if existing.path != path {
                        info!("File moved from {:?} to {:?}", existing.path, path);
                        if let Some(stale) = by_path.filter(|f| f.id != existing.id) {
                            ctx.library.video_files.delete(stale.id)?;
                        }
                    }
                    existing
                }
                _ => match by_path {
                    Some(mut changed) => {
                        // Same path, different content: forget what we knew
                        changed.hash = hash;
                        changed.size = size;
                        changed.media = None;
                        changed.episode_id = None;
                        changed.series_id = None;
                        changed
                    }
                    None => VideoFile::new(&path, hash, size),
                },
            };
            file.path = path.clone();
            file.updated_at = chrono::Utc::now().timestamp();
            ctx.library.video_files.save(&mut file)?;
            file
        }
    };

    ctx.queues.enqueue(Command::ProcessFile {
        file_id: file.id,
        force_refresh: force,
    })?;
    Ok(CommandOutcome::Completed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_file_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.mkv");
        std::fs::write(&path, b"abc").unwrap();
        assert_eq!(
            hash_file_content(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert!(hash_file_content(&dir.path().join("missing.mkv")).is_err());
    }
}

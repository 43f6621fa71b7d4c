use super::defer_for_ban;
use crate::commands::{Command, CommandContext, CommandOutcome};
use crate::library::{FileStatus, VideoFile};
use crate::metadata::ProviderError;
use anyhow::{Context, Result};
use tracing::{debug, info, warn};

pub(super) async fn run(
    file_id: i64,
    force_refresh: bool,
    ctx: &CommandContext,
) -> Result<CommandOutcome> {
    let Some(mut file) = ctx.library.video_files.get_by_id(file_id)? else {
        warn!("Video file {} no longer in the library, skipping", file_id);
        return Ok(CommandOutcome::Completed);
    };

    if !file.is_identified() || force_refresh {
        ctx.api_limiter.ensure_rate().await;
        let remote = match ctx.metadata.identify_file(&file.hash, file.size).await {
            Ok(remote) => remote,
            Err(ProviderError::NotFound) => {
                info!("File {:?} is unknown to the metadata service", file.path);
                return Ok(CommandOutcome::Completed);
            }
            Err(ProviderError::Banned { retry_after }) => {
                return defer_for_ban(ctx, retry_after);
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to identify {:?}", file.path));
            }
        };

        file.episode_id = Some(remote.episode_id);
        file.series_id = Some(remote.series_id);
        file.media = Some(remote.media_info());
        // Re-identification gets a fresh retention decision
        if file.status == FileStatus::Rejected && tokio::fs::try_exists(&file.path).await? {
            file.status = FileStatus::Active;
        }
        file.updated_at = chrono::Utc::now().timestamp();
        ctx.library.video_files.save(&mut file)?;
        info!(
            "Identified {:?} as episode {} of series {}",
            file.path, remote.episode_id, remote.series_id
        );
    } else {
        debug!("File {} already identified", file_id);
    }

    // Checked on every run, not only right after identification
    if let Some(series_id) = file.series_id {
        if ctx.library.series.get_by_id(series_id)?.is_none() {
            ctx.queues.enqueue(Command::GetSeries {
                series_id,
                force_refresh: false,
            })?;
        }
    }

    if file.status == FileStatus::Active {
        apply_retention(&file, ctx).await?;
    }
    Ok(CommandOutcome::Completed)
}

/// Runs the admission gate on `file`, then keeps only the best active file
/// of its episode.
async fn apply_retention(file: &VideoFile, ctx: &CommandContext) -> Result<()> {
    if !ctx.quality.should_keep(file) {
        discard(file.clone(), FileStatus::Rejected, ctx).await?;
        return Ok(());
    }
    let Some(episode_id) = file.episode_id else {
        return Ok(());
    };

    let mut candidates = Vec::new();
    for candidate in ctx.library.files_for_episode(episode_id)? {
        if candidate.status != FileStatus::Active {
            continue;
        }
        if ctx.quality.should_keep(&candidate) {
            candidates.push(candidate);
        } else {
            discard(candidate, FileStatus::Rejected, ctx).await?;
        }
    }

    let Some(best) = ctx.quality.best_of(&candidates) else {
        return Ok(());
    };
    if candidates.len() > 1 {
        info!(
            "Keeping {:?} for episode {} out of {} files",
            candidates[best].path,
            episode_id,
            candidates.len()
        );
    }
    for (index, candidate) in candidates.into_iter().enumerate() {
        if index != best {
            discard(candidate, FileStatus::Superseded, ctx).await?;
        }
    }
    Ok(())
}

async fn discard(mut file: VideoFile, status: FileStatus, ctx: &CommandContext) -> Result<()> {
    info!("Marking {:?} as {}", file.path, status.as_str());
    file.status = status;
    file.updated_at = chrono::Utc::now().timestamp();
    ctx.library.video_files.save(&mut file)?;

    if ctx.settings.remove_discarded_files {
        match tokio::fs::remove_file(&file.path).await {
            Ok(()) => info!("Deleted {:?}", file.path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to delete {:?}: {}", file.path, e),
        }
    }
    Ok(())
}

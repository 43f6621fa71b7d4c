use super::defer_for_ban;
use crate::commands::{Command, CommandContext, CommandOutcome};
use crate::library::{Character, Creator, Series};
use crate::metadata::ProviderError;
use anyhow::{Context, Result};
use std::collections::HashSet;
use tracing::{debug, info, warn};

pub(super) async fn run(
    series_id: i64,
    force_refresh: bool,
    ctx: &CommandContext,
) -> Result<CommandOutcome> {
    let existing = ctx.library.series.get_by_id(series_id)?;
    // A series row without the sync marker was left behind by an interrupted run
    if existing.as_ref().is_some_and(|s| s.synced_at.is_some()) && !force_refresh {
        debug!("Series {} already known", series_id);
        request_images(series_id, ctx)?;
        return Ok(CommandOutcome::Completed);
    }

    ctx.api_limiter.ensure_rate().await;
    let remote = match ctx.metadata.get_series(series_id).await {
        Ok(remote) => remote,
        Err(ProviderError::NotFound) => {
            warn!("Series {} is unknown to the metadata service", series_id);
            return Ok(CommandOutcome::Completed);
        }
        Err(ProviderError::Banned { retry_after }) => return defer_for_ban(ctx, retry_after),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to fetch series {}", series_id));
        }
    };

    let now = chrono::Utc::now().timestamp();
    // A downloaded image stays valid as long as its url does not change
    let cover_path = existing
        .filter(|s| s.cover_url == remote.cover_url)
        .and_then(|s| s.cover_path);
    let mut series = Series {
        id: series_id,
        title: remote.title,
        episode_count: remote.episode_count,
        cover_url: remote.cover_url,
        cover_path,
        updated_at: now,
        synced_at: None,
    };
    ctx.library.series.save(&mut series)?;

    let mut seen = HashSet::new();
    let mut creator_ids = Vec::new();
    for remote_character in remote.characters {
        seen.insert(remote_character.id);
        if let Some(creator_id) = remote_character.creator_id {
            if !creator_ids.contains(&creator_id) {
                creator_ids.push(creator_id);
            }
        }
        let picture_path = ctx
            .library
            .characters
            .get_by_id(remote_character.id)?
            .filter(|c| c.picture_url == remote_character.picture_url)
            .and_then(|c| c.picture_path);
        let mut character = Character {
            id: remote_character.id,
            series_id,
            name: remote_character.name,
            picture_url: remote_character.picture_url,
            picture_path,
            updated_at: now,
            creator_id: remote_character.creator_id,
        };
        ctx.library.characters.save(&mut character)?;
    }
    for stale in ctx.library.characters_for_series(series_id)? {
        if !seen.contains(&stale.id) {
            ctx.library.characters.delete(stale.id)?;
        }
    }

    for creator_id in creator_ids {
        if !force_refresh && ctx.library.creators.get_by_id(creator_id)?.is_some() {
            continue;
        }
        if let Some(outcome) = update_creator(creator_id, ctx).await? {
            return Ok(outcome);
        }
    }

    series.synced_at = Some(chrono::Utc::now().timestamp());
    ctx.library.series.save(&mut series)?;
    info!(
        "Updated series {} ({}) with {} characters",
        series.id,
        series.title,
        seen.len()
    );

    request_images(series_id, ctx)?;
    Ok(CommandOutcome::Completed)
}

/// Looks a creator up and stores it. Returns an outcome only when the
/// command has to stop here.
async fn update_creator(creator_id: i64, ctx: &CommandContext) -> Result<Option<CommandOutcome>> {
    ctx.api_limiter.ensure_short_rate().await;
    let remote = match ctx.metadata.get_creator(creator_id).await {
        Ok(remote) => remote,
        Err(ProviderError::NotFound) => {
            warn!("Creator {} is unknown to the metadata service", creator_id);
            return Ok(None);
        }
        Err(ProviderError::Banned { retry_after }) => {
            return defer_for_ban(ctx, retry_after).map(Some);
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to fetch creator {}", creator_id));
        }
    };

    let picture_path = ctx
        .library
        .creators
        .get_by_id(creator_id)?
        .filter(|c| c.picture_url == remote.picture_url)
        .and_then(|c| c.picture_path);
    let mut creator = Creator {
        id: creator_id,
        name: remote.name,
        picture_url: remote.picture_url,
        picture_path,
        updated_at: chrono::Utc::now().timestamp(),
    };
    ctx.library.creators.save(&mut creator)?;
    Ok(None)
}

fn request_images(series_id: i64, ctx: &CommandContext) -> Result<()> {
    ctx.queues.enqueue(Command::DownloadSeriesImages {
        series_id,
        force: false,
    })?;
    Ok(())
}

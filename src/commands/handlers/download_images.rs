use crate::commands::{CommandContext, CommandOutcome};
use crate::fetcher::{FetchError, ImageFormat};
use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Default)]
struct Tally {
    downloaded: usize,
    failed: usize,
}

pub(super) async fn run(series_id: i64, force: bool, ctx: &CommandContext) -> Result<CommandOutcome> {
    let Some(mut series) = ctx.library.series.get_by_id(series_id)? else {
        warn!("Series {} not in the library, no images to fetch", series_id);
        return Ok(CommandOutcome::Completed);
    };

    let images_dir = &ctx.settings.images_dir;
    let mut tally = Tally::default();

    if let Some(url) = series.cover_url.clone() {
        let destination = images_dir
            .join("series")
            .join(series_id.to_string())
            .join("cover");
        match fetch_image(&url, &destination, series.cover_path.as_deref(), force, ctx).await {
            Ok(Some(path)) => {
                series.cover_path = Some(path);
                ctx.library.series.save(&mut series)?;
                tally.downloaded += 1;
            }
            Ok(None) => {}
            Err(e) => {
                warn!("Failed to download cover of series {}: {}", series_id, e);
                tally.failed += 1;
            }
        }
    }

    if ctx.settings.download_characters {
        for mut character in ctx.library.characters_for_series(series_id)? {
            let Some(url) = character.picture_url.clone() else {
                continue;
            };
            let destination = images_dir.join("characters").join(character.id.to_string());
            let existing = character.picture_path.as_deref();
            match fetch_image(&url, &destination, existing, force, ctx).await {
                Ok(Some(path)) => {
                    character.picture_path = Some(path);
                    ctx.library.characters.save(&mut character)?;
                    tally.downloaded += 1;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Failed to download picture of {}: {}", character.name, e);
                    tally.failed += 1;
                }
            }
        }
    }

    if ctx.settings.download_creators {
        for mut creator in ctx.library.creators_for_series(series_id)? {
            let Some(url) = creator.picture_url.clone() else {
                continue;
            };
            let destination = images_dir.join("creators").join(creator.id.to_string());
            let existing = creator.picture_path.as_deref();
            match fetch_image(&url, &destination, existing, force, ctx).await {
                Ok(Some(path)) => {
                    creator.picture_path = Some(path);
                    ctx.library.creators.save(&mut creator)?;
                    tally.downloaded += 1;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Failed to download picture of {}: {}", creator.name, e);
                    tally.failed += 1;
                }
            }
        }
    }

    info!(
        "Images for series {}: {} downloaded, {} failed",
        series_id, tally.downloaded, tally.failed
    );
    Ok(CommandOutcome::Completed)
}

/// Downloads `url` next to `destination`. Returns None when `existing`
/// already holds a valid image and `force` is off.
async fn fetch_image(
    url: &str,
    destination: &Path,
    existing: Option<&Path>,
    force: bool,
    ctx: &CommandContext,
) -> Result<Option<PathBuf>, FetchError> {
    if !force {
        if let Some(existing) = existing {
            if ImageFormat::detect_file(existing).await.is_some() {
                debug!("{:?} already present", existing);
                return Ok(None);
            }
        }
    }

    let artifact = ctx
        .fetcher
        .fetch_to_file(url, destination, ctx.settings.image_max_attempts)
        .await?;
    let installed = artifact.move_into_place().await?;

    // The new image may carry a different extension than the old one
    if let Some(old) = existing.filter(|old| *old != installed.as_path()) {
        let _ = tokio::fs::remove_file(old).await;
    }
    Ok(Some(installed))
}

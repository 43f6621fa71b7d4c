//! Command handlers, one module per command type.

mod download_images;
mod get_series;
mod hash_file;
mod process_file;

pub use hash_file::hash_file_content;

use super::{Command, CommandContext, CommandOutcome};
use anyhow::Result;
use std::time::Duration;
use tracing::{error, warn};

/// Runs a command to completion.
pub async fn execute(command: Command, ctx: CommandContext) -> Result<CommandOutcome> {
    match command {
        Command::HashFile { path, force } => hash_file::run(path, force, &ctx).await,
        Command::ProcessFile {
            file_id,
            force_refresh,
        } => process_file::run(file_id, force_refresh, &ctx).await,
        Command::GetSeries {
            series_id,
            force_refresh,
        } => get_series::run(series_id, force_refresh, &ctx).await,
        Command::DownloadSeriesImages { series_id, force } => {
            download_images::run(series_id, force, &ctx).await
        }
    }
}

/// Pauses the general queue after the metadata service banned us and
/// schedules its resumption. The command is kept for later.
fn defer_for_ban(ctx: &CommandContext, retry_after: Duration) -> Result<CommandOutcome> {
    let queue = ctx.queues.general.clone();
    warn!(
        "Metadata service ban, pausing {} queue for {:?}",
        queue.kind(),
        retry_after
    );
    queue.pause()?;

    let limiter = ctx.api_limiter.clone();
    tokio::spawn(async move {
        tokio::time::sleep(retry_after).await;
        limiter.reset();
        if let Err(e) = queue.resume() {
            error!("Failed to resume {} queue after ban: {:#}", queue.kind(), e);
        }
    });
    Ok(CommandOutcome::Deferred)
}

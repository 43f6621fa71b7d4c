use anyhow::{Context, Result};
use clap::Parser;
use media_librarian::commands::{
    spawn_workers, CommandContext, CommandStore, QueueSet, SqliteCommandStore,
};
use media_librarian::config::{AppConfig, CliConfig, FileConfig};
use media_librarian::fetcher::{ArtifactFetcher, HttpTransport};
use media_librarian::library::{run_event_loop, scan_import_folders, FileEvent, LibraryStore};
use media_librarian::metadata::HttpMetadataClient;
use media_librarian::quality::QualityFilter;
use media_librarian::rate_limiter::RateLimiter;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const FILE_EVENT_CHANNEL_SIZE: usize = 1024;

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Directory holding commands.db and library.db.
    #[clap(long, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// Path to a TOML config file. Its values override the CLI ones.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Where downloaded artwork is stored. Defaults to <db_dir>/images.
    #[clap(long, value_parser = parse_path)]
    pub images_dir: Option<PathBuf>,

    /// Folder to scan for video files at startup. Can be repeated.
    #[clap(long = "import-folder", value_parser = parse_path)]
    pub import_folders: Vec<PathBuf>,

    /// Base URL of the metadata service.
    #[clap(long)]
    pub metadata_url: Option<String>,

    /// Timeout in seconds for metadata and image requests.
    #[clap(long, default_value_t = 30)]
    pub metadata_timeout_sec: u64,

    /// Interval in seconds between queue status log lines. 0 disables them.
    #[clap(long, default_value_t = 60)]
    pub status_log_interval_secs: u64,

    /// Delete rejected and superseded files from disk.
    #[clap(long)]
    pub remove_discarded_files: bool,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            db_dir: self.db_dir.clone(),
            images_dir: self.images_dir.clone(),
            import_folders: self.import_folders.clone(),
            metadata_url: self.metadata_url.clone(),
            metadata_timeout_sec: self.metadata_timeout_sec,
            status_log_interval_secs: self.status_log_interval_secs,
            remove_discarded_files: self.remove_discarded_files,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;

    info!("Opening databases in {:?}...", config.db_dir);
    let library = Arc::new(LibraryStore::new(&config.library_db_path(), true)?);
    let command_store: Arc<dyn CommandStore> =
        Arc::new(SqliteCommandStore::new(config.commands_db_path())?);
    let queues = Arc::new(QueueSet::load(command_store)?);
    for status in queues.status() {
        info!("Queue {}", status);
    }

    let api_limiter = Arc::new(RateLimiter::new("api", config.rate_limits.api()));
    let image_limiter = Arc::new(RateLimiter::new("images", config.rate_limits.images()));

    let timeout = Duration::from_secs(config.metadata_timeout_sec);
    let fetcher = ArtifactFetcher::new(
        Arc::new(HttpTransport::new(timeout)?),
        image_limiter,
        config.temp_dir(),
        config.fetcher.retry_delay,
    );
    let metadata = HttpMetadataClient::new(&config.metadata_url, config.metadata_timeout_sec)?;
    info!("Metadata service configured at {}", config.metadata_url);

    let ctx = CommandContext {
        library,
        api_limiter,
        metadata: Arc::new(metadata),
        fetcher: Arc::new(fetcher),
        quality: Arc::new(QualityFilter::from_policy(config.quality.clone())?),
        queues: queues.clone(),
        settings: config.handler_settings(),
    };

    let cancel = CancellationToken::new();
    let workers = spawn_workers(&queues, ctx, cancel.clone());

    // The sender is where an external watcher plugs in
    let (event_sender, event_receiver) = mpsc::channel::<FileEvent>(FILE_EVENT_CHANNEL_SIZE);
    let extensions = Arc::new(config.import.video_extensions.clone());
    let event_loop = tokio::spawn(run_event_loop(
        event_receiver,
        queues.clone(),
        extensions.clone(),
        cancel.clone(),
    ));

    if !config.import_folders.is_empty() {
        let folders = config.import_folders.clone();
        let scan_queues = queues.clone();
        tokio::task::spawn_blocking(move || {
            match scan_import_folders(&folders, &scan_queues, &extensions) {
                Ok(count) => info!("Import scan queued {} files", count),
                Err(e) => error!("Import scan failed: {:#}", e),
            }
        });
    }

    if config.status_log_interval_secs > 0 {
        let status_queues = queues.clone();
        let interval = Duration::from_secs(config.status_log_interval_secs);
        let status_cancel = cancel.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);

            // Skip the first immediate tick, wait for the first interval
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = status_cancel.cancelled() => break,
                }
                for status in status_queues.status() {
                    info!("Queue {}", status);
                }
            }
        });
    }

    info!("Media librarian running, press Ctrl+C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Shutting down, waiting for running commands...");
    cancel.cancel();
    drop(event_sender);
    for worker in workers {
        if let Err(e) = worker.await {
            error!("Queue worker ended abnormally: {}", e);
        }
    }
    if let Err(e) = event_loop.await {
        error!("File event loop ended abnormally: {}", e);
    }
    info!("Stopped");
    Ok(())
}

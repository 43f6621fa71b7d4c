//! End-to-end tests for the durable command queues: enqueue, drain, restart.

mod common;

use common::{remote_file, remote_series, wait_until, TestEnv, JPEG_BYTES, PNG_BYTES};
use media_librarian::commands::{
    hash_file_content, Command, CommandPriority, CommandStore, QueueKind,
};
use media_librarian::library::{scan_import_folders, FileStatus, DEFAULT_VIDEO_EXTENSIONS};
use std::path::PathBuf;

fn extensions() -> Vec<String> {
    DEFAULT_VIDEO_EXTENSIONS.iter().map(|e| e.to_string()).collect()
}

fn drain_keys(librarian: &common::Librarian, kind: QueueKind) -> Vec<String> {
    let queue = librarian.queues.get(kind);
    let mut keys = Vec::new();
    while let Some(request) = queue.try_next().unwrap() {
        queue.complete(&request).unwrap();
        keys.push(request.key);
    }
    keys
}

#[tokio::test]
async fn test_pending_commands_are_restored_once_after_restart() {
    let env = TestEnv::new();
    {
        let librarian = env.open();
        let general = &librarian.queues.general;
        general
            .enqueue(Command::ProcessFile {
                file_id: 1,
                force_refresh: false,
            })
            .unwrap();
        general
            .enqueue(Command::GetSeries {
                series_id: 7,
                force_refresh: false,
            })
            .unwrap();
        general
            .enqueue_with_priority(
                Command::ProcessFile {
                    file_id: 2,
                    force_refresh: false,
                },
                CommandPriority::Urgent,
            )
            .unwrap();
        librarian
            .queues
            .enqueue(Command::DownloadSeriesImages {
                series_id: 7,
                force: false,
            })
            .unwrap();
    }

    let librarian = env.open();
    assert_eq!(librarian.queues.general.queue_count(), 3);
    assert_eq!(librarian.queues.images.queue_count(), 1);
    assert_eq!(librarian.queues.hasher.queue_count(), 0);

    // Restored commands still deduplicate
    assert!(!librarian
        .queues
        .enqueue(Command::GetSeries {
            series_id: 7,
            force_refresh: true,
        })
        .unwrap());

    assert_eq!(
        drain_keys(&librarian, QueueKind::General),
        vec!["ProcessFile_2", "GetSeries_7", "ProcessFile_1"]
    );
    drop(librarian);

    let librarian = env.open();
    assert_eq!(librarian.queues.general.queue_count(), 0);
    assert_eq!(librarian.store.count(QueueKind::General).unwrap(), 0);
    assert_eq!(librarian.queues.images.queue_count(), 1);
}

#[tokio::test]
async fn test_import_folder_is_identified_and_artwork_downloaded() {
    let env = TestEnv::new();
    let video = env.media_dir.path().join("Show").join("01.mkv");
    std::fs::create_dir_all(video.parent().unwrap()).unwrap();
    std::fs::write(&video, b"episode one").unwrap();
    let hash = hash_file_content(&video).unwrap();

    env.metadata.add_file(&hash, remote_file(100, 10, "1920x1080"));
    env.metadata.add_series(remote_series(10, &[1, 2]));
    env.transport.serve("http://img/series/10", PNG_BYTES);
    env.transport.serve("http://img/characters/1", JPEG_BYTES);
    env.transport.serve("http://img/characters/2", PNG_BYTES);

    let librarian = env.open();
    let folders = vec![env.media_dir.path().to_path_buf()];
    assert_eq!(
        scan_import_folders(&folders, &librarian.queues, &extensions()).unwrap(),
        1
    );

    let running = librarian.start();
    let library = librarian.library.clone();
    wait_until(|| {
        library
            .characters_for_series(10)
            .unwrap()
            .iter()
            .all(|c| c.picture_path.is_some())
            && library
                .series
                .get_by_id(10)
                .unwrap()
                .is_some_and(|s| s.cover_path.is_some())
    })
    .await;
    wait_until(|| librarian.is_idle()).await;
    running.stop().await;

    let file = library.file_by_hash(&hash).unwrap().unwrap();
    assert_eq!(file.path, video);
    assert_eq!(file.episode_id, Some(100));
    assert_eq!(file.status, FileStatus::Active);

    let images = env.db_dir.path().join("images");
    let series = library.series.get_by_id(10).unwrap().unwrap();
    assert_eq!(series.cover_path, Some(images.join("series/10/cover.png")));
    assert!(images.join("characters/1.jpg").is_file());
    assert!(images.join("characters/2.png").is_file());

    for kind in [QueueKind::General, QueueKind::Hasher, QueueKind::Images] {
        assert_eq!(librarian.store.count(kind).unwrap(), 0);
    }
}

#[tokio::test]
async fn test_better_copy_supersedes_existing_file() {
    let env = TestEnv::new();
    let low = env.media_dir.path().join("show-01-720p.mkv");
    let high = env.media_dir.path().join("show-01-1080p.mkv");
    std::fs::write(&low, b"small").unwrap();
    std::fs::write(&high, b"large").unwrap();

    let low_hash = hash_file_content(&low).unwrap();
    let high_hash = hash_file_content(&high).unwrap();
    env.metadata
        .add_file(&low_hash, remote_file(100, 10, "1280x720"));
    env.metadata
        .add_file(&high_hash, remote_file(100, 10, "1920x1080"));
    env.metadata.add_series(remote_series(10, &[]));

    let librarian = env.open();
    let running = librarian.start();
    for path in [low, high] {
        librarian
            .queues
            .enqueue(Command::HashFile { path, force: false })
            .unwrap();
    }

    let library = librarian.library.clone();
    wait_until(|| {
        library
            .video_files
            .get_all()
            .unwrap()
            .iter()
            .filter(|f| f.is_identified())
            .count()
            == 2
    })
    .await;
    wait_until(|| librarian.is_idle()).await;
    running.stop().await;

    let low = library.file_by_hash(&low_hash).unwrap().unwrap();
    let high = library.file_by_hash(&high_hash).unwrap().unwrap();
    assert_eq!(low.status, FileStatus::Superseded);
    assert_eq!(high.status, FileStatus::Active);
    // Discarded files stay on disk unless deletion is enabled
    assert!(low.path.exists());
}

#[tokio::test]
async fn test_unfinished_work_runs_after_restart() {
    let env = TestEnv::new();
    let video = env.media_dir.path().join("02.mkv");
    std::fs::write(&video, b"episode two").unwrap();
    let hash = hash_file_content(&video).unwrap();
    env.metadata.add_file(&hash, remote_file(200, 20, "1920x1080"));
    env.metadata.add_series(remote_series(20, &[]));

    {
        let librarian = env.open();
        librarian
            .queues
            .enqueue(Command::HashFile {
                path: video.clone(),
                force: false,
            })
            .unwrap();
        // Shut down before any worker ran
    }

    let librarian = env.open();
    assert_eq!(librarian.queues.hasher.queue_count(), 1);
    let running = librarian.start();
    let library = librarian.library.clone();
    wait_until(|| {
        library
            .file_by_hash(&hash)
            .unwrap()
            .is_some_and(|f| f.is_identified())
    })
    .await;
    wait_until(|| librarian.is_idle()).await;
    running.stop().await;

    assert_eq!(library.video_files.count().unwrap(), 1);
    assert_eq!(env.metadata.identify_calls(), 1);

    let files: Vec<PathBuf> = library
        .video_files
        .get_all()
        .unwrap()
        .into_iter()
        .map(|f| f.path)
        .collect();
    assert_eq!(files, vec![video]);
}

//! Maintenance CLI for cuenote storage.
//!
//! This is the manual-recovery surface for the storage engine:
//! - inspect backend and lock status
//! - export/import the whole store as JSON
//! - create, list and restore backups (including the backup key a
//!   failed bulk overwrite reports)
//! - clear the store
//!
//! Running any command against a cloud-configured store also drains the
//! pending-sync outbox, so a stuck replication can be flushed by plain
//! `cuenote status`.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::{Command, Config, ImportStrategy};
use cuenote_storage_cloud::CloudClient;
use cuenote_storage_core::{CloudStore, LocalStore, StoredVideoData};
use cuenote_storage_local::FileStore;
use cuenote_sync::{
    merge_notes, LoadAllOptions, NotesRepository, SaveOptions, StorageAdapter, SyncConfig,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so `export` can write clean JSON to stdout.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::parse();
    let data_dir = config.effective_data_dir();
    debug!("cuenote v{}", env!("CARGO_PKG_VERSION"));
    debug!("  Data dir: {}", data_dir.display());

    let local: Arc<dyn LocalStore> = Arc::new(FileStore::new(&data_dir));
    let cloud: Option<Arc<dyn CloudStore>> = config.cloud_url.clone().map(|url| {
        Arc::new(CloudClient::new(url, config.cloud_token.clone())) as Arc<dyn CloudStore>
    });

    let sync_config = SyncConfig::default();
    let adapter = Arc::new(StorageAdapter::new(local, cloud, &sync_config));
    let cloud_active = adapter.initialize().await?;
    let repo = NotesRepository::new(Arc::clone(&adapter), sync_config);

    match config.command {
        Command::Status => status(&adapter, &repo, &data_dir, cloud_active).await,
        Command::Export { output } => export(&repo, &output).await,
        Command::Import { input, strategy } => import(&repo, &input, strategy).await,
        Command::Backup { reason } => backup(&repo, &reason).await,
        Command::Backups => list_backups(&repo).await,
        Command::Restore { key } => restore(&repo, &key).await,
        Command::Clear { yes } => clear(&repo, yes).await,
    }
}

async fn status(
    adapter: &StorageAdapter,
    repo: &NotesRepository,
    data_dir: &Path,
    cloud_active: bool,
) -> anyhow::Result<()> {
    let videos = repo.load_all_videos(LoadAllOptions::default()).await?;
    let notes: usize = videos.iter().map(|v| v.data.notes.len()).sum();
    let backups = repo.list_backups().await?;
    let lock = repo.lock_status();

    println!("Data directory:  {}", data_dir.display());
    println!(
        "Cloud sync:      {}",
        if cloud_active { "active" } else { "inactive" }
    );
    println!("Videos:          {}", videos.len());
    println!("Notes:           {}", notes);
    println!("Pending sync:    {}", adapter.pending_sync_count().await);
    println!("Backups:         {}", backups.len());
    println!("Local footprint: {} bytes", adapter.bytes_in_use().await?);
    println!(
        "Write lock:      {}",
        if lock.locked {
            format!("held ({})", lock.active_operations.join(", "))
        } else {
            "idle".to_string()
        }
    );
    Ok(())
}

async fn export(repo: &NotesRepository, output: &str) -> anyhow::Result<()> {
    let videos: Vec<StoredVideoData> = repo
        .load_all_videos(LoadAllOptions::default())
        .await?
        .into_iter()
        .map(|s| s.data)
        .collect();
    let json = serde_json::to_string_pretty(&videos).context("encode export")?;

    if output == "-" {
        println!("{json}");
    } else {
        tokio::fs::write(output, json)
            .await
            .with_context(|| format!("write export to {output}"))?;
        println!("Exported {} videos to {}", videos.len(), output);
    }
    Ok(())
}

async fn import(
    repo: &NotesRepository,
    input: &Path,
    strategy: ImportStrategy,
) -> anyhow::Result<()> {
    let raw = tokio::fs::read_to_string(input)
        .await
        .with_context(|| format!("read import file {}", input.display()))?;
    let videos: Vec<StoredVideoData> =
        serde_json::from_str(&raw).context("parse import file as a video export")?;

    match strategy {
        ImportStrategy::Replace => {
            let report = repo.overwrite_all_notes(videos).await?;
            if report.data_loss_warning {
                warn!(
                    "import holds fewer than half the notes previously stored; \
                     backup {} has the prior state",
                    report.backup_key
                );
            }
            println!(
                "Replaced store: {} videos written, {} deleted (backup {})",
                report.videos_written, report.videos_deleted, report.backup_key
            );
        }
        ImportStrategy::Merge => {
            let mut merged_videos = 0;
            let mut merged_notes = 0;
            for video in videos {
                let existing = repo.load_notes(&video.video_id).await?;
                let combined = merge_notes(&existing, &video.notes);
                merged_notes += combined.len();
                merged_videos += 1;
                let options = SaveOptions {
                    video_title: (!video.video_title.is_empty()).then_some(video.video_title),
                    group: video.group,
                    channel_name: video.channel_name,
                    channel_id: video.channel_id,
                };
                repo.save_notes(&video.video_id, combined, options).await?;
            }
            println!("Merged {merged_videos} videos ({merged_notes} notes after merge)");
        }
    }
    Ok(())
}

async fn backup(repo: &NotesRepository, reason: &str) -> anyhow::Result<()> {
    let key = repo.create_backup(reason).await?;
    println!("Created {key}");
    Ok(())
}

async fn list_backups(repo: &NotesRepository) -> anyhow::Result<()> {
    let backups = repo.list_backups().await?;
    if backups.is_empty() {
        println!("No backups stored.");
        return Ok(());
    }
    for b in backups {
        println!(
            "{}  {}  {} videos, {} notes  ({})",
            b.key,
            format_timestamp(b.timestamp),
            b.videos_count,
            b.notes_count,
            b.reason
        );
    }
    Ok(())
}

async fn restore(repo: &NotesRepository, key: &str) -> anyhow::Result<()> {
    let restored = repo.restore_backup(key).await?;
    println!("Restored {restored} videos from {key}");
    Ok(())
}

async fn clear(repo: &NotesRepository, yes: bool) -> anyhow::Result<()> {
    if !yes {
        bail!("clearing deletes every stored video; re-run with --yes to confirm");
    }
    let deleted = repo.clear_all_notes().await?;
    println!("Deleted {deleted} videos");
    Ok(())
}

fn format_timestamp(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| format!("@{millis}"))
}

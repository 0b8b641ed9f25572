//! Bulk overwrite and backup behavior: the mandatory verified backup,
//! the data-loss heuristic, rollback on mid-flight failure and the
//! restore path.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{note, video, FlakyStore};
use cuenote_storage_core::{LocalStore, StorageError, StoredVideoData};
use cuenote_storage_local::MemoryStore;
use cuenote_sync::{
    checksum, keys, BackupRecord, LoadAllOptions, NotesRepository, SaveOptions, StorageAdapter,
    SyncConfig,
};

fn memory_repo() -> (Arc<MemoryStore>, NotesRepository) {
    let local = Arc::new(MemoryStore::new());
    let adapter = Arc::new(StorageAdapter::local_only(
        local.clone(),
        &SyncConfig::default(),
    ));
    (local, NotesRepository::new(adapter, SyncConfig::default()))
}

fn flaky_repo() -> (Arc<FlakyStore>, NotesRepository) {
    let local = FlakyStore::new();
    let adapter = Arc::new(StorageAdapter::local_only(
        local.clone(),
        &SyncConfig::default(),
    ));
    (local, NotesRepository::new(adapter, SyncConfig::default()))
}

async fn seed_notes(repo: &NotesRepository, video_id: &str, count: usize) {
    let notes = (0..count)
        .map(|i| note(&format!("{video_id}-n{i}"), i as f64, &format!("note {i}")))
        .collect();
    repo.save_notes(video_id, notes, SaveOptions::default())
        .await
        .unwrap();
}

async fn current_state(repo: &NotesRepository) -> Vec<StoredVideoData> {
    let mut videos: Vec<StoredVideoData> = repo
        .load_all_videos(LoadAllOptions::default())
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.data)
        .collect();
    videos.sort_by(|a, b| a.video_id.cmp(&b.video_id));
    videos
}

#[tokio::test]
async fn overwrite_takes_a_verified_backup_and_flags_data_loss() {
    let (local, repo) = memory_repo();
    seed_notes(&repo, "v1", 10).await;

    let report = repo.overwrite_all_notes(vec![video("v2", 1)]).await.unwrap();

    assert_eq!(report.videos_deleted, 1);
    assert_eq!(report.videos_written, 1);
    assert!(report.data_loss_warning, "10 notes shrank to 1");

    let state = current_state(&repo).await;
    assert_eq!(state.len(), 1);
    assert_eq!(state[0].video_id, "v2");

    // The backup captured the pre-overwrite store and verifies.
    let record: BackupRecord =
        serde_json::from_value(local.get(&report.backup_key).await.unwrap().unwrap()).unwrap();
    assert!(record.is_valid());
    assert_eq!(record.reason, "pre-overwrite");
    assert_eq!(record.videos_count, 1);
    assert_eq!(record.notes_count, 10);
    assert_eq!(record.data[0].video_id, "v1");
    assert_eq!(record.checksum, checksum(&record.data));
}

#[tokio::test]
async fn exact_half_is_not_a_data_loss_warning() {
    let (_local, repo) = memory_repo();
    seed_notes(&repo, "v1", 10).await;

    let mut replacement = video("v1", 5);
    replacement.last_modified = 0;
    let report = repo.overwrite_all_notes(vec![replacement]).await.unwrap();
    assert!(!report.data_loss_warning, "5 of 10 is exactly half");

    // Less than half does warn.
    let mut shrunk = video("v1", 2);
    shrunk.last_modified = 0;
    let report = repo.overwrite_all_notes(vec![shrunk]).await.unwrap();
    assert!(report.data_loss_warning, "2 of 5 is below half");
}

#[tokio::test]
async fn overwrite_preserves_incoming_timestamps_and_fills_missing() {
    let (_local, repo) = memory_repo();

    let mut dated = video("v1", 1);
    dated.last_modified = 777;
    let mut undated = video("v2", 1);
    undated.last_modified = 0;
    undated.notes[0].id = String::new();

    repo.overwrite_all_notes(vec![dated, undated]).await.unwrap();

    let state = current_state(&repo).await;
    assert_eq!(state[0].last_modified, 777);
    assert!(state[1].last_modified > 0, "missing timestamp is filled in");
    assert!(state[1].notes[0].has_id(), "missing note ids are assigned");
}

#[tokio::test]
async fn failed_overwrite_rolls_back_to_the_prior_state() {
    let (local, repo) = flaky_repo();
    seed_notes(&repo, "v1", 3).await;
    seed_notes(&repo, "v2", 2).await;
    let before = current_state(&repo).await;

    // The replacement for v1 lands, then the write of v3 fails.
    local.fail_writes_to("v3");
    let err = repo
        .overwrite_all_notes(vec![video("v1", 1), video("v3", 1)])
        .await
        .unwrap_err();

    let backup_key = match err {
        StorageError::OverwriteRolledBack { backup_key, reason } => {
            assert!(reason.contains("injected write failure"), "reason: {reason}");
            backup_key
        }
        other => panic!("expected OverwriteRolledBack, got {other:?}"),
    };

    let after = current_state(&repo).await;
    assert_eq!(after, before, "store matches its pre-overwrite state");
    assert_eq!(checksum(&after), checksum(&before));

    // The backup that drove the rollback is still there for inspection.
    assert!(local.get(&backup_key).await.unwrap().is_some());
}

#[tokio::test]
async fn failed_rollback_is_fatal_and_names_the_backup() {
    let (local, repo) = flaky_repo();
    seed_notes(&repo, "v1", 2).await;
    seed_notes(&repo, "v2", 2).await;

    // The incoming write fails, and so does re-saving v2 during rollback.
    local.fail_writes_to("v3");
    local.fail_writes_to("v2");
    let err = repo
        .overwrite_all_notes(vec![video("v3", 1)])
        .await
        .unwrap_err();

    assert!(err.is_fatal());
    let backup_key = match err {
        StorageError::RestoreFailed { backup_key, reason } => {
            assert!(reason.contains("rollback failed"), "reason: {reason}");
            backup_key
        }
        other => panic!("expected RestoreFailed, got {other:?}"),
    };

    // Manual recovery path: the backup record survived and validates.
    local.heal();
    let restored = repo.restore_backup(&backup_key).await.unwrap();
    assert_eq!(restored, 2);
    let state = current_state(&repo).await;
    assert_eq!(state.len(), 2);
    assert_eq!(state[0].notes.len(), 2);
}

#[tokio::test]
async fn duplicate_ids_are_rejected_before_anything_runs() {
    let (local, repo) = memory_repo();
    seed_notes(&repo, "v1", 1).await;

    let err = repo
        .overwrite_all_notes(vec![video("dup", 1), video("dup", 2)])
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidArgument(_)));

    // Validation precedes the snapshot, so no backup was written.
    let entries = local.get_all().await.unwrap();
    assert!(entries
        .keys()
        .all(|k| keys::parse_backup_timestamp(k).is_none()));
    assert_eq!(current_state(&repo).await.len(), 1);
}

#[tokio::test]
async fn reserved_ids_in_the_input_are_rejected() {
    let (_local, repo) = memory_repo();
    let err = repo
        .overwrite_all_notes(vec![video(keys::USER_SETTINGS, 1)])
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidArgument(_)));
}

#[tokio::test]
async fn clear_then_restore_recovers_everything() {
    let (_local, repo) = memory_repo();
    seed_notes(&repo, "v1", 2).await;
    seed_notes(&repo, "v2", 3).await;

    let backup_key = repo.create_backup("manual").await.unwrap();
    assert_eq!(repo.clear_all_notes().await.unwrap(), 2);
    assert_eq!(repo.get_total_notes_count().await.unwrap(), 0);

    let restored = repo.restore_backup(&backup_key).await.unwrap();
    assert_eq!(restored, 2);
    assert_eq!(repo.get_total_notes_count().await.unwrap(), 5);
}

#[tokio::test]
async fn restore_replaces_rather_than_merges() {
    let (_local, repo) = memory_repo();
    seed_notes(&repo, "v1", 2).await;
    let backup_key = repo.create_backup("manual").await.unwrap();

    // Diverge from the snapshot in every direction.
    seed_notes(&repo, "v1", 4).await;
    seed_notes(&repo, "v3", 1).await;

    repo.restore_backup(&backup_key).await.unwrap();

    let state = current_state(&repo).await;
    assert_eq!(state.len(), 1);
    assert_eq!(state[0].video_id, "v1");
    assert_eq!(state[0].notes.len(), 2, "post-snapshot edits are gone");
}

#[tokio::test]
async fn restore_refuses_a_tampered_backup() {
    let (local, repo) = memory_repo();
    seed_notes(&repo, "v1", 2).await;
    let backup_key = repo.create_backup("manual").await.unwrap();

    let mut raw = local.get(&backup_key).await.unwrap().unwrap();
    raw["notesCount"] = serde_json::json!(99);
    local.set(&backup_key, raw).await.unwrap();

    let err = repo.restore_backup(&backup_key).await.unwrap_err();
    match err {
        StorageError::Backup(msg) => assert!(msg.contains("refusing restore"), "msg: {msg}"),
        other => panic!("expected Backup, got {other:?}"),
    }
    // The store is untouched by the refused restore.
    assert_eq!(repo.get_total_notes_count().await.unwrap(), 2);
}

#[tokio::test]
async fn restore_of_a_missing_backup_is_not_found() {
    let (_local, repo) = memory_repo();
    let err = repo.restore_backup("backup_123456").await.unwrap_err();
    assert!(matches!(err, StorageError::NotFound(_)));
}

#[tokio::test]
async fn backups_list_newest_first_and_prune_to_the_retained_set() {
    let (_local, repo) = memory_repo();
    seed_notes(&repo, "v1", 1).await;

    let mut created = Vec::new();
    for _ in 0..7 {
        created.push(repo.create_backup("scheduled").await.unwrap());
    }

    let listed = repo.list_backups().await.unwrap();
    assert_eq!(listed.len(), 5, "only the newest five are retained");
    assert!(
        listed.windows(2).all(|w| w[0].timestamp > w[1].timestamp),
        "listing is strictly newest first"
    );
    // The survivors are the five most recent creations.
    let listed_keys: Vec<&str> = listed.iter().map(|b| b.key.as_str()).collect();
    let expected: Vec<&str> = created[2..].iter().rev().map(String::as_str).collect();
    assert_eq!(listed_keys, expected);
    assert_eq!(listed[0].reason, "scheduled");
    assert_eq!(listed[0].videos_count, 1);
}

#[tokio::test]
async fn same_millisecond_backups_get_distinct_keys() {
    let (_local, repo) = memory_repo();
    seed_notes(&repo, "v1", 1).await;

    let a = repo.create_backup("first").await.unwrap();
    let b = repo.create_backup("second").await.unwrap();
    assert_ne!(a, b);
    assert!(
        keys::parse_backup_timestamp(&b).unwrap() > keys::parse_backup_timestamp(&a).unwrap(),
        "later backups sort newer even within one millisecond"
    );
}

#[tokio::test]
async fn an_aborted_overwrite_still_leaves_its_backup() {
    let (local, repo) = flaky_repo();
    seed_notes(&repo, "v1", 2).await;

    local.fail_writes_to("v2");
    let err = repo
        .overwrite_all_notes(vec![video("v2", 1)])
        .await
        .unwrap_err();
    let backup_key = match err {
        StorageError::OverwriteRolledBack { backup_key, .. } => backup_key,
        other => panic!("expected OverwriteRolledBack, got {other:?}"),
    };

    let record: BackupRecord =
        serde_json::from_value(local.get(&backup_key).await.unwrap().unwrap()).unwrap();
    assert!(record.is_valid());
    assert_eq!(record.data.len(), 1);
}

#[tokio::test]
async fn a_failed_overwrite_releases_the_global_lock() {
    // Backups share the global lock with overwrites and must not be
    // starved by a failure that came before them.
    let (local, repo) = flaky_repo();
    seed_notes(&repo, "v1", 1).await;

    local.fail_writes_to("v9");
    let _ = repo
        .overwrite_all_notes(vec![video("v9", 1)])
        .await
        .unwrap_err();
    local.heal();

    let key = repo.create_backup("after-failure").await.unwrap();
    assert!(local.get(&key).await.unwrap().is_some());

    // The rolled-back store still holds exactly the seeded video.
    let state = current_state(&repo).await;
    assert_eq!(state.len(), 1);
    assert_eq!(state[0].video_id, "v1");
}

#[tokio::test]
async fn overwrite_with_an_empty_input_clears_the_store() {
    let (_local, repo) = memory_repo();
    seed_notes(&repo, "v1", 2).await;
    seed_notes(&repo, "v2", 1).await;

    let report = repo.overwrite_all_notes(Vec::new()).await.unwrap();
    assert_eq!(report.videos_deleted, 2);
    assert_eq!(report.videos_written, 0);
    assert!(report.data_loss_warning, "zero incoming notes against three");
    assert_eq!(repo.get_total_notes_count().await.unwrap(), 0);

    // The backup still allows a full recovery.
    assert_eq!(repo.restore_backup(&report.backup_key).await.unwrap(), 2);
    assert_eq!(repo.get_total_notes_count().await.unwrap(), 3);
}

#[tokio::test]
async fn lock_ceiling_does_not_fire_for_ordinary_overwrites() {
    let (_local, repo) = memory_repo();
    seed_notes(&repo, "v1", 1).await;
    // Generous data set, still far below the ceiling.
    let incoming: Vec<StoredVideoData> = (0..50).map(|i| video(&format!("w{i}"), 2)).collect();
    let report = tokio::time::timeout(
        Duration::from_secs(5),
        repo.overwrite_all_notes(incoming),
    )
    .await
    .expect("overwrite completes promptly")
    .unwrap();
    assert_eq!(report.videos_written, 50);
}

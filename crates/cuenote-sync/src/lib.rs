//! Hybrid storage synchronization engine for cuenote.
//!
//! Three layers, leaves first:
//!
//! - [`StorageLock`]: per-video FIFO write serialization with a global
//!   mode for whole-store operations and a hold-time ceiling that
//!   aborts wedged writers.
//! - [`StorageAdapter`]: one get/set/remove/enumerate surface over a
//!   local store and an optional cloud replica. Local writes first,
//!   always; cloud writes opportunistically, with a persisted outbox
//!   for the ones that fail.
//! - [`NotesRepository`]: the domain API. Note CRUD with a TTL cache,
//!   retention-aware enumeration, the import merge algorithm, and
//!   bulk overwrite protected by checksummed backups with rollback.
//!
//! Reads never lock and may observe a state mid-transition; writes to
//! the same video never overlap. A save is durable once the local
//! write lands, whatever the cloud does afterwards.

mod adapter;
mod backup;
mod config;
pub mod keys;
mod lock;
mod merge;
mod notes;
mod presets;
mod settings;

pub use adapter::StorageAdapter;
pub use backup::{checksum, BackupInfo, BackupRecord};
pub use config::SyncConfig;
pub use lock::{LockStatus, StorageLock};
pub use merge::merge_notes;
pub use notes::{
    LoadAllOptions, NotesRepository, OverwriteReport, SaveOptions, SaveOutcome,
};
pub use presets::PresetsRepository;
pub use settings::{SettingsDocument, SettingsRepository};

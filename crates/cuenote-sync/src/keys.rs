//! Persisted key layout for the local store.
//!
//! Video records live under their raw video id. Everything else the
//! engine persists sits under a reserved name or prefix, and
//! enumeration filters those out when listing videos.

/// Manual video ordering list.
pub const VIDEO_ORDER: &str = "video_order";

/// Consolidated user settings document.
pub const USER_SETTINGS: &str = "user_settings";

/// Prefix for numbered preset template lists.
pub const PRESET_PREFIX: &str = "preset_";

/// Prefix for timestamped backup records.
pub const BACKUP_PREFIX: &str = "backup_";

/// Outbox of videos awaiting cloud replication.
pub const PENDING_SYNC: &str = "pending_cloud_sync";

/// Whether a key belongs to the engine rather than to a video record.
pub fn is_reserved(key: &str) -> bool {
    key == VIDEO_ORDER
        || key == USER_SETTINGS
        || key == PENDING_SYNC
        || key.starts_with(PRESET_PREFIX)
        || key.starts_with(BACKUP_PREFIX)
}

/// Whether a key enumerates as a video record.
pub fn is_video_key(key: &str) -> bool {
    !is_reserved(key)
}

/// Storage key for a backup taken at the given epoch-millisecond time.
pub fn backup_key(timestamp_ms: i64) -> String {
    format!("{BACKUP_PREFIX}{timestamp_ms}")
}

/// Timestamp encoded in a backup key, if the key is one.
pub fn parse_backup_timestamp(key: &str) -> Option<i64> {
    key.strip_prefix(BACKUP_PREFIX)?.parse().ok()
}

/// Storage key for preset slot `n`.
pub fn preset_key(n: u32) -> String {
    format!("{PRESET_PREFIX}{n}")
}

/// Preset slot encoded in a preset key, if the key is one.
pub fn parse_preset_number(key: &str) -> Option<u32> {
    key.strip_prefix(PRESET_PREFIX)?.parse().ok()
}

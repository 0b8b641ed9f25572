use cuenote_storage_core::{now_millis, StoredVideoData};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Snapshot of the whole video set, written before destructive bulk
/// operations and kept for manual recovery.
///
/// A record is only usable for restore while all three of its internal
/// invariants hold: the counts match the payload and the checksum
/// matches the data. Anything else is treated as corruption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupRecord {
    /// Creation time, epoch milliseconds. Also encoded in the storage key.
    pub timestamp: i64,
    /// Why the backup was taken, e.g. "pre-overwrite".
    pub reason: String,
    pub videos_count: usize,
    pub notes_count: usize,
    pub checksum: String,
    pub data: Vec<StoredVideoData>,
}

impl BackupRecord {
    /// Snapshot the given video set with freshly computed invariants.
    pub fn new(reason: impl Into<String>, data: Vec<StoredVideoData>) -> Self {
        let videos_count = data.len();
        let notes_count = data.iter().map(|v| v.notes.len()).sum();
        let checksum = checksum(&data);
        Self {
            timestamp: now_millis(),
            reason: reason.into(),
            videos_count,
            notes_count,
            checksum,
            data,
        }
    }

    /// Check the three integrity invariants.
    ///
    /// Returns the first violation as a human-readable reason.
    pub fn validate(&self) -> Result<(), String> {
        if self.data.len() != self.videos_count {
            return Err(format!(
                "video count mismatch: recorded {}, payload has {}",
                self.videos_count,
                self.data.len()
            ));
        }
        let notes: usize = self.data.iter().map(|v| v.notes.len()).sum();
        if notes != self.notes_count {
            return Err(format!(
                "note count mismatch: recorded {}, payload has {}",
                self.notes_count, notes
            ));
        }
        let computed = checksum(&self.data);
        if computed != self.checksum {
            return Err(format!(
                "checksum mismatch: recorded {}, computed {}",
                self.checksum, computed
            ));
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

/// Listing entry for a stored backup: everything but the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupInfo {
    /// Storage key the full record lives under.
    pub key: String,
    pub timestamp: i64,
    pub reason: String,
    pub videos_count: usize,
    pub notes_count: usize,
}

impl BackupInfo {
    pub fn from_record(key: impl Into<String>, record: &BackupRecord) -> Self {
        Self {
            key: key.into(),
            timestamp: record.timestamp,
            reason: record.reason.clone(),
            videos_count: record.videos_count,
            notes_count: record.notes_count,
        }
    }
}

/// Structural checksum over a video set.
///
/// Hashes the ordered sequence of video id and note count. Each id is
/// length-prefixed so its bytes cannot run into the next field; ids
/// are externally supplied and may contain anything. Cheap and
/// order-sensitive, it catches count drift and truncation. It does not
/// see note content, so two payloads with matching ids and counts but
/// different text hash identically.
pub fn checksum(data: &[StoredVideoData]) -> String {
    let mut hasher = Sha256::new();
    for video in data {
        let id = video.video_id.as_bytes();
        hasher.update((id.len() as u64).to_le_bytes());
        hasher.update(id);
        hasher.update((video.notes.len() as u64).to_le_bytes());
    }
    hex::encode(hasher.finalize())
}

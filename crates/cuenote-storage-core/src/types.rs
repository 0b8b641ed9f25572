use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single user-authored note, anchored to a position in a video.
///
/// Persisted as camelCase JSON; the format predates this implementation
/// and existing stores must keep decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// Globally unique id. Legacy notes may carry an empty id until
    /// their next write assigns one.
    #[serde(default)]
    pub id: String,
    /// Human-readable position, e.g. "12:34".
    #[serde(default, alias = "timestamp")]
    pub timestamp_display: String,
    /// Position in the video, in seconds. Never negative.
    pub timestamp_seconds: f64,
    /// Note body.
    #[serde(default)]
    pub text: String,
}

impl Note {
    /// Create a note with a freshly assigned id.
    pub fn new(timestamp_display: impl Into<String>, timestamp_seconds: f64, text: impl Into<String>) -> Self {
        Self {
            id: Self::generate_id(),
            timestamp_display: timestamp_display.into(),
            timestamp_seconds,
            text: text.into(),
        }
    }

    /// Generate a collision-resistant note id.
    pub fn generate_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Whether this note has been assigned an id yet.
    pub fn has_id(&self) -> bool {
        !self.id.is_empty()
    }
}

/// The persisted record for one video: its metadata and note list.
///
/// Ordering of `notes` is insertion order, not time order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredVideoData {
    /// External, stable video identifier. Also the storage key.
    pub video_id: String,
    #[serde(default)]
    pub video_title: String,
    #[serde(default)]
    pub notes: Vec<Note>,
    /// Epoch milliseconds of the last successful write. Drives
    /// last-writer-wins reconciliation between backends.
    #[serde(default)]
    pub last_modified: i64,
    /// Optional user-assigned group label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
}

impl StoredVideoData {
    /// Create an empty record for a video.
    pub fn new(video_id: impl Into<String>) -> Self {
        Self {
            video_id: video_id.into(),
            video_title: String::new(),
            notes: Vec::new(),
            last_modified: 0,
            group: None,
            channel_name: None,
            channel_id: None,
        }
    }

    /// Assign ids to any notes that lack one. Returns how many were assigned.
    pub fn assign_missing_note_ids(&mut self) -> usize {
        let mut assigned = 0;
        for note in &mut self.notes {
            if !note.has_id() {
                note.id = Note::generate_id();
                assigned += 1;
            }
        }
        assigned
    }

    /// The earliest note position, if any notes exist.
    pub fn first_note_timestamp(&self) -> Option<f64> {
        self.notes
            .iter()
            .map(|n| n.timestamp_seconds)
            .reduce(f64::min)
    }
}

/// One video's record plus derived enumeration metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoSummary {
    pub data: StoredVideoData,
    /// Minimum `timestamp_seconds` across the video's notes.
    pub first_note_timestamp: Option<f64>,
}

impl VideoSummary {
    pub fn from_data(data: StoredVideoData) -> Self {
        let first_note_timestamp = data.first_note_timestamp();
        Self {
            data,
            first_note_timestamp,
        }
    }
}

/// Current wall-clock time as epoch milliseconds, the unit every
/// persisted `last_modified` uses.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

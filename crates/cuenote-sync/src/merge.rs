use std::collections::HashSet;

use cuenote_storage_core::Note;

/// How many text characters participate in the fallback identity key.
const KEY_TEXT_PREFIX: usize = 20;

/// Identity key for a note: its id when assigned, otherwise a
/// composite of rounded timestamp and a text prefix (legacy notes
/// predate ids).
fn note_key(note: &Note) -> String {
    if note.has_id() {
        format!("id:{}", note.id)
    } else {
        composite_key(note)
    }
}

fn composite_key(note: &Note) -> String {
    let prefix: String = note.text.chars().take(KEY_TEXT_PREFIX).collect();
    format!("ts:{}:{}", note.timestamp_seconds.round() as i64, prefix)
}

/// Merge imported notes into an existing list.
///
/// Existing notes always survive and keep priority by identity. An
/// imported note already present by identity is skipped. Otherwise its
/// timestamp decides:
///
/// - nobody at that timestamp: the import is added as-is;
/// - same timestamp, identical text: duplicate, dropped;
/// - same timestamp, different text: a real conflict, both are kept.
///   The import gets a fresh id so it can never collide with or
///   shadow the note it conflicts with.
///
/// The result is sorted ascending by timestamp. Merging the same
/// import twice yields the same set.
pub fn merge_notes(existing: &[Note], imported: &[Note]) -> Vec<Note> {
    let mut merged: Vec<Note> = existing.to_vec();
    let mut seen: HashSet<String> = existing.iter().map(note_key).collect();

    for import in imported {
        if seen.contains(&note_key(import)) {
            continue;
        }

        let same_timestamp: Vec<&Note> = merged
            .iter()
            .filter(|n| n.timestamp_seconds == import.timestamp_seconds)
            .collect();

        if same_timestamp.iter().any(|n| n.text == import.text) {
            continue;
        }

        let mut note = import.clone();
        if !same_timestamp.is_empty() {
            note.id = Note::generate_id();
        }
        seen.insert(note_key(&note));
        merged.push(note);
    }

    merged.sort_by(|a, b| {
        a.timestamp_seconds
            .partial_cmp(&b.timestamp_seconds)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    merged
}

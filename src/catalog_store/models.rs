//! Track metadata as shown to the user during ranking.

use serde::{Deserialize, Serialize};

pub const MAX_TRACK_ID_LENGTH: usize = 64;

/// Immutable display metadata of a track.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub title: String,
    pub artist_name: String,
    pub album_name: String,
    #[serde(default)]
    pub cover_url: Option<String>,
    #[serde(default)]
    pub duration_ms: u64,
}

/// Track ids are 1 to 64 characters of `[A-Za-z0-9_-]`.
///
/// The `:` character in particular is never part of an id, it separates the
/// two halves of a pair key.
pub fn is_valid_track_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_TRACK_ID_LENGTH
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

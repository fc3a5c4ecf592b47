//! TrackCatalog trait definition.

use super::models::Track;
use anyhow::Result;

/// Read/write access to the track metadata catalog.
///
/// The ranking engine only reads from it; tracks get written when a user adds
/// them to their vault.
pub trait TrackCatalog: Send + Sync {
    /// Returns the tracks with the given ids, in no particular order.
    /// Unknown ids are skipped, callers that need every id must check the length.
    fn get_tracks_by_ids(&self, ids: &[String]) -> Result<Vec<Track>>;

    /// Returns a single track, Ok(None) if it doesn't exist.
    fn get_track(&self, id: &str) -> Result<Option<Track>>;

    /// Inserts the track or refreshes its metadata if the id is already known.
    fn upsert_track(&self, track: &Track) -> Result<()>;

    /// Number of tracks in the catalog.
    fn get_tracks_count(&self) -> usize;
}

use super::models::{ComparisonEvent, PoolEntry, Rating, RatingUpdate, RecordOutcome, Replay};
use anyhow::Result;
use std::time::SystemTime;

pub trait RatingStore: Send + Sync {
    /// Returns up to `limit` vault rows of the user, skipping `exclude_ids`.
    /// Rows with the fewest games come first.
    fn list_ratings(
        &self,
        user_id: usize,
        exclude_ids: &[String],
        limit: usize,
    ) -> Result<Vec<PoolEntry>>;

    /// Returns Ok(None) if the track is not in the user's vault.
    fn get_rating(&self, user_id: usize, track_id: &str) -> Result<Option<Rating>>;

    /// Reads both ratings, stores what `update` computes from them and appends
    /// the comparison to the log, all in a single transaction.
    fn record_comparison(
        &self,
        user_id: usize,
        winner_id: &str,
        loser_id: &str,
        decided_at: SystemTime,
        update: &dyn Fn(&Rating, &Rating) -> RatingUpdate,
    ) -> Result<RecordOutcome>;

    /// Adds a track to the user's vault with zero games.
    /// Returns false, leaving the existing row untouched, if it was already there.
    fn add_to_pool(&self, user_id: usize, track_id: &str, initial_rating: f64) -> Result<bool>;

    /// Returns false if the track wasn't in the vault.
    fn remove_from_pool(&self, user_id: usize, track_id: &str) -> Result<bool>;

    /// All vault rows of the user, highest rating first.
    fn list_rankings(&self, user_id: usize) -> Result<Vec<PoolEntry>>;

    /// Reads the user's vault and comparison log (oldest first), hands both to
    /// `replay` and stores the ratings it returns, all in a single transaction.
    /// A vote can't land between the read and the write.
    fn recompute_ratings(
        &self,
        user_id: usize,
        replay: &dyn Fn(&[PoolEntry], &[ComparisonEvent]) -> Replay,
    ) -> Result<Replay>;

    /// Deletes the user's vault and comparison log. Returns the number of
    /// vault rows removed.
    fn reset_user(&self, user_id: usize) -> Result<usize>;
}

/// Append-only record of decided comparisons. Rows are only ever written by
/// [`RatingStore::record_comparison`], together with the ratings they moved.
pub trait ComparisonLog: Send + Sync {
    /// Most recent first, all of them when `limit` is None.
    fn get_comparisons(&self, user_id: usize, limit: Option<usize>) -> Result<Vec<ComparisonEvent>>;

    /// Oldest first, the order in which they have to be replayed.
    fn get_comparisons_chronological(&self, user_id: usize) -> Result<Vec<ComparisonEvent>>;
}

pub trait FullRatingStore: RatingStore + ComparisonLog {}

impl<T: RatingStore + ComparisonLog> FullRatingStore for T {}

use super::elo;
use super::error::RankingError;
use super::models::VoteResult;
use super::settings::EloSettings;
use crate::catalog_store::is_valid_track_id;
use crate::rating_store::{
    ComparisonEvent, FullRatingStore, PoolEntry, Rating, RecordOutcome, Replay,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, error, info};

pub(super) fn check_track_id(id: &str) -> Result<(), RankingError> {
    if is_valid_track_id(id) {
        Ok(())
    } else {
        Err(RankingError::InvalidTrackId(id.to_string()))
    }
}

/// Applies decided comparisons to a user's ratings.
pub struct RatingUpdater {
    store: Arc<dyn FullRatingStore>,
    settings: EloSettings,
}

impl RatingUpdater {
    pub fn new(store: Arc<dyn FullRatingStore>, settings: EloSettings) -> Self {
        RatingUpdater { store, settings }
    }

    /// Updates both ratings and appends the comparison to the log in one
    /// transaction. Nothing is written when this returns an error.
    pub fn apply_result(
        &self,
        user_id: usize,
        winner_id: &str,
        loser_id: &str,
    ) -> Result<VoteResult, RankingError> {
        check_track_id(winner_id)?;
        check_track_id(loser_id)?;
        if winner_id == loser_id {
            return Err(RankingError::InvalidVote(format!(
                "{} cannot be compared with itself",
                winner_id
            )));
        }

        let settings = &self.settings;
        let outcome = self
            .store
            .record_comparison(
                user_id,
                winner_id,
                loser_id,
                SystemTime::now(),
                &|winner: &Rating, loser: &Rating| elo::apply_result(settings, winner, loser),
            )
            .map_err(|err| {
                error!(
                    "Failed to record {} > {} for user {}: {:?}",
                    winner_id, loser_id, user_id, err
                );
                RankingError::RatingUpdateFailed(err)
            })?;

        match outcome {
            RecordOutcome::Recorded(update) => {
                debug!(
                    "User {} voted {} ({:.1}) over {} ({:.1})",
                    user_id, winner_id, update.winner.rating, loser_id, update.loser.rating
                );
                Ok(VoteResult {
                    winner_id: winner_id.to_string(),
                    loser_id: loser_id.to_string(),
                    winner_rating: update.winner.rating,
                    loser_rating: update.loser.rating,
                    winner_games: update.winner.games,
                    loser_games: update.loser.games,
                })
            }
            RecordOutcome::MissingTrack(track_id) => Err(RankingError::TrackNotInPool(track_id)),
        }
    }

    /// Rebuilds the user's ratings by replaying the comparison log from the
    /// initial state. Comparisons involving tracks no longer in the vault are
    /// skipped. Returns the number of comparisons replayed.
    pub fn recompute(&self, user_id: usize) -> Result<usize, RankingError> {
        let settings = &self.settings;
        let result = self
            .store
            .recompute_ratings(user_id, &|vault: &[PoolEntry], events: &[ComparisonEvent]| {
                replay_log(settings, vault, events)
            })
            .map_err(RankingError::RatingUpdateFailed)?;

        info!(
            "Recomputed {} ratings of user {} from {} comparisons",
            result.ratings.len(),
            user_id,
            result.replayed
        );
        Ok(result.replayed)
    }
}

/// Replays `events` in order over `vault`, every track starting from the
/// initial rating. The returned ratings keep the order of `vault`.
pub(super) fn replay_log(
    settings: &EloSettings,
    vault: &[PoolEntry],
    events: &[ComparisonEvent],
) -> Replay {
    let mut ratings: HashMap<&str, Rating> = vault
        .iter()
        .map(|e| (e.track_id.as_str(), Rating::initial(settings.initial_rating)))
        .collect();

    let mut replayed = 0;
    for event in events {
        let (Some(winner), Some(loser)) = (
            ratings.get(event.winner_id.as_str()).copied(),
            ratings.get(event.loser_id.as_str()).copied(),
        ) else {
            continue;
        };
        let update = elo::apply_result(settings, &winner, &loser);
        ratings.insert(event.winner_id.as_str(), update.winner);
        ratings.insert(event.loser_id.as_str(), update.loser);
        replayed += 1;
    }

    let ratings = vault
        .iter()
        .map(|e| {
            let r = ratings[e.track_id.as_str()];
            PoolEntry::new(e.track_id.clone(), r.rating, r.games)
        })
        .collect();
    Replay { ratings, replayed }
}

use super::error::RankingError;
use super::models::{
    AddOutcome, HistoryEntry, Matchup, MatchupRequest, RankedTrack, VoteOutcome, VoteRequest,
};
use super::pool::CandidatePoolLoader;
use super::selector::{select_match, Selection};
use super::settings::RankingSettings;
use super::updater::{check_track_id, RatingUpdater};
use crate::catalog_store::{Track, TrackCatalog};
use crate::rating_store::FullRatingStore;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Entry point of the ranking flow: matchups, votes and vault maintenance
/// for one authenticated caller at a time.
///
/// The engine keeps no per-user state between calls, the caller sends its
/// exclusion lists with every request.
pub struct RankingEngine {
    catalog: Arc<dyn TrackCatalog>,
    store: Arc<dyn FullRatingStore>,
    loader: CandidatePoolLoader,
    updater: RatingUpdater,
    settings: RankingSettings,
}

fn authenticated(caller: Option<usize>) -> Result<usize, RankingError> {
    caller.ok_or(RankingError::Unauthorized)
}

fn check_request(request: &MatchupRequest) -> Result<(), RankingError> {
    if let Some(seed) = &request.seed_track_id {
        check_track_id(seed)?;
    }
    for id in &request.exclude_track_ids {
        check_track_id(id)?;
    }
    Ok(())
}

impl RankingEngine {
    pub fn new(
        catalog: Arc<dyn TrackCatalog>,
        store: Arc<dyn FullRatingStore>,
        settings: RankingSettings,
    ) -> Self {
        RankingEngine {
            loader: CandidatePoolLoader::new(store.clone(), settings.pool_limit),
            updater: RatingUpdater::new(store.clone(), settings.elo.clone()),
            catalog,
            store,
            settings,
        }
    }

    pub fn settings(&self) -> &RankingSettings {
        &self.settings
    }

    /// Returns Ok(None) when the vault doesn't have two eligible tracks.
    pub fn get_next_matchup(
        &self,
        caller: Option<usize>,
        request: &MatchupRequest,
    ) -> Result<Option<Matchup>, RankingError> {
        self.get_next_matchup_with_rng(caller, request, &mut rand::rng())
    }

    pub fn get_next_matchup_with_rng<R: Rng + ?Sized>(
        &self,
        caller: Option<usize>,
        request: &MatchupRequest,
        rng: &mut R,
    ) -> Result<Option<Matchup>, RankingError> {
        let user_id = authenticated(caller)?;
        check_request(request)?;
        self.select_and_hydrate(user_id, request, rng)
    }

    /// Records the vote and proposes the next matchup. If the vote can't be
    /// recorded the error is returned and no matchup is proposed.
    pub fn submit_vote_and_fetch_next(
        &self,
        caller: Option<usize>,
        vote: &VoteRequest,
    ) -> Result<VoteOutcome, RankingError> {
        self.submit_vote_and_fetch_next_with_rng(caller, vote, &mut rand::rng())
    }

    pub fn submit_vote_and_fetch_next_with_rng<R: Rng + ?Sized>(
        &self,
        caller: Option<usize>,
        vote: &VoteRequest,
        rng: &mut R,
    ) -> Result<VoteOutcome, RankingError> {
        let user_id = authenticated(caller)?;
        let next_request = vote.next_matchup_request();
        check_request(&next_request)?;

        let result = self
            .updater
            .apply_result(user_id, &vote.winner_id, &vote.loser_id)?;
        let next = self.select_and_hydrate(user_id, &next_request, rng)?;
        Ok(VoteOutcome { result, next })
    }

    fn select_and_hydrate<R: Rng + ?Sized>(
        &self,
        user_id: usize,
        request: &MatchupRequest,
        rng: &mut R,
    ) -> Result<Option<Matchup>, RankingError> {
        let seed = request.seed_track_id.as_deref();
        let pool = self
            .loader
            .load(Some(user_id), &request.exclude_track_ids, seed)?;
        let exclude_pair_keys: HashSet<String> =
            request.exclude_pair_keys.iter().cloned().collect();

        let (track_a_id, track_b_id, pair_key, degraded) =
            match select_match(&pool, seed, &exclude_pair_keys, &self.settings, rng) {
                Selection::Matched {
                    track_a_id,
                    track_b_id,
                    pair_key,
                    degraded,
                } => (track_a_id, track_b_id, pair_key, degraded),
                Selection::NotEnoughCandidates => {
                    debug!(
                        "Not enough candidates for user {} (pool of {})",
                        user_id,
                        pool.len()
                    );
                    return Ok(None);
                }
            };
        if degraded {
            info!(
                "Seed {:?} not in the pool of user {}, picked a random track instead",
                seed, user_id
            );
        }

        let mut tracks: HashMap<String, Track> = self
            .catalog
            .get_tracks_by_ids(&[track_a_id.clone(), track_b_id.clone()])?
            .into_iter()
            .map(|t| (t.id.clone(), t))
            .collect();
        match (tracks.remove(&track_a_id), tracks.remove(&track_b_id)) {
            (Some(track_a), Some(track_b)) => Ok(Some(Matchup {
                pair_key,
                track_a,
                track_b,
                degraded,
            })),
            _ => {
                warn!(
                    "Catalog is missing tracks of matchup {} for user {}",
                    pair_key, user_id
                );
                Ok(None)
            }
        }
    }

    /// Stores the track metadata and adds it to the caller's vault. A track
    /// already in the vault keeps its rating.
    pub fn add_track_to_vault(
        &self,
        caller: Option<usize>,
        track: &Track,
    ) -> Result<AddOutcome, RankingError> {
        let user_id = authenticated(caller)?;
        check_track_id(&track.id)?;

        self.catalog.upsert_track(track)?;
        let added = self
            .store
            .add_to_pool(user_id, &track.id, self.settings.elo.initial_rating)?;
        if added {
            info!("User {} added {} to the vault", user_id, track.id);
            Ok(AddOutcome::Added)
        } else {
            Ok(AddOutcome::AlreadyInVault)
        }
    }

    /// The comparison log is left untouched.
    pub fn remove_track_from_vault(
        &self,
        caller: Option<usize>,
        track_id: &str,
    ) -> Result<(), RankingError> {
        let user_id = authenticated(caller)?;
        check_track_id(track_id)?;
        if self.store.remove_from_pool(user_id, track_id)? {
            info!("User {} removed {} from the vault", user_id, track_id);
            Ok(())
        } else {
            Err(RankingError::TrackNotInPool(track_id.to_string()))
        }
    }

    pub fn get_rankings(&self, caller: Option<usize>) -> Result<Vec<RankedTrack>, RankingError> {
        let user_id = authenticated(caller)?;
        let entries = self.store.list_rankings(user_id)?;
        let ids: Vec<String> = entries.iter().map(|e| e.track_id.clone()).collect();
        let mut tracks: HashMap<String, Track> = self
            .catalog
            .get_tracks_by_ids(&ids)?
            .into_iter()
            .map(|t| (t.id.clone(), t))
            .collect();

        let mut ranked = Vec::with_capacity(entries.len());
        for entry in entries {
            match tracks.remove(&entry.track_id) {
                Some(track) => ranked.push(RankedTrack {
                    position: ranked.len() + 1,
                    track,
                    rating: entry.rating,
                    games: entry.games,
                }),
                None => warn!("Vault track {} is not in the catalog", entry.track_id),
            }
        }
        Ok(ranked)
    }

    /// Wipes the caller's vault and comparison log. Returns the number of
    /// tracks removed.
    pub fn reset(&self, caller: Option<usize>) -> Result<usize, RankingError> {
        let user_id = authenticated(caller)?;
        Ok(self.store.reset_user(user_id)?)
    }

    /// Replays the caller's comparison log. Returns the number of comparisons
    /// that were applied.
    pub fn recompute(&self, caller: Option<usize>) -> Result<usize, RankingError> {
        let user_id = authenticated(caller)?;
        self.updater.recompute(user_id)
    }

    /// Most recent comparisons first.
    pub fn history(
        &self,
        caller: Option<usize>,
        limit: usize,
    ) -> Result<Vec<HistoryEntry>, RankingError> {
        let user_id = authenticated(caller)?;
        Ok(self
            .store
            .get_comparisons(user_id, Some(limit))?
            .into_iter()
            .map(|e| HistoryEntry::new(e.winner_id, e.loser_id, e.decided_at))
            .collect())
    }
}

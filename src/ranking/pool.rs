use super::error::RankingError;
use crate::rating_store::{FullRatingStore, PoolEntry};
use std::sync::Arc;
use tracing::debug;

/// Loads the tracks of a user's vault that are eligible for the next matchup.
pub struct CandidatePoolLoader {
    store: Arc<dyn FullRatingStore>,
    pool_limit: usize,
}

impl CandidatePoolLoader {
    pub fn new(store: Arc<dyn FullRatingStore>, pool_limit: usize) -> Self {
        CandidatePoolLoader { store, pool_limit }
    }

    /// Returns at most `pool_limit` entries, none of them in `exclude_track_ids`.
    ///
    /// A vault larger than the limit is cut down to its least played tracks,
    /// `keep_track_id` is swapped in if it was cut so that a requested seed
    /// isn't lost to the limit.
    pub fn load(
        &self,
        caller: Option<usize>,
        exclude_track_ids: &[String],
        keep_track_id: Option<&str>,
    ) -> Result<Vec<PoolEntry>, RankingError> {
        let user_id = caller.ok_or(RankingError::Unauthorized)?;
        let mut pool = self
            .store
            .list_ratings(user_id, exclude_track_ids, self.pool_limit)?;

        if let Some(keep) = keep_track_id {
            let excluded = exclude_track_ids.iter().any(|id| id == keep);
            let loaded = pool.iter().any(|e| e.track_id == keep);
            if !excluded && !loaded && pool.len() >= self.pool_limit {
                if let Some(rating) = self.store.get_rating(user_id, keep)? {
                    pool.pop();
                    pool.push(PoolEntry {
                        track_id: keep.to_string(),
                        rating: rating.rating,
                        games: rating.games,
                    });
                }
            }
        }

        debug!(
            "Loaded pool of {} for user {} ({} excluded)",
            pool.len(),
            user_id,
            exclude_track_ids.len()
        );
        Ok(pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rating_store::{RatingStore, SqliteRatingStore};
    use tempfile::TempDir;

    fn loader_with_tracks(ids: &[&str], pool_limit: usize) -> (CandidatePoolLoader, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteRatingStore::new(temp_dir.path().join("ranking.db")).unwrap();
        for id in ids {
            store.add_to_pool(1, id, 1500.0).unwrap();
        }
        (
            CandidatePoolLoader::new(Arc::new(store), pool_limit),
            temp_dir,
        )
    }

    #[test]
    fn requires_a_caller() {
        let (loader, _temp_dir) = loader_with_tracks(&["a", "b"], 10);
        assert!(matches!(
            loader.load(None, &[], None),
            Err(RankingError::Unauthorized)
        ));
    }

    #[test]
    fn respects_exclusions_and_limit() {
        let (loader, _temp_dir) = loader_with_tracks(&["a", "b", "c", "d"], 3);
        let pool = loader.load(Some(1), &["b".to_string()], None).unwrap();
        assert_eq!(pool.len(), 3);
        assert!(pool.iter().all(|e| e.track_id != "b"));

        let pool = loader
            .load(Some(1), &["a".to_string(), "b".to_string()], None)
            .unwrap();
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn keeps_requested_track_beyond_the_limit() {
        let (loader, _temp_dir) = loader_with_tracks(&["a", "b", "c", "d"], 2);
        let pool = loader.load(Some(1), &[], Some("d")).unwrap();
        assert_eq!(pool.len(), 2);
        assert!(pool.iter().any(|e| e.track_id == "d"));

        // Excluded tracks stay excluded, unknown ones are ignored
        let pool = loader.load(Some(1), &["d".to_string()], Some("d")).unwrap();
        assert!(pool.iter().all(|e| e.track_id != "d"));
        let pool = loader.load(Some(1), &[], Some("zzz")).unwrap();
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn empty_vault_gives_empty_pool() {
        let (loader, _temp_dir) = loader_with_tracks(&[], 10);
        assert!(loader.load(Some(1), &[], None).unwrap().is_empty());
    }
}

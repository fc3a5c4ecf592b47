use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Current rating state of a track in a user's vault.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub rating: f64,
    pub games: u32,
}

impl Rating {
    pub fn initial(rating: f64) -> Self {
        Rating { rating, games: 0 }
    }
}

/// A vault row as seen by the matchmaking code.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoolEntry {
    pub track_id: String,
    pub rating: f64,
    pub games: u32,
}

impl PoolEntry {
    pub fn new<T: Into<String>>(track_id: T, rating: f64, games: u32) -> Self {
        PoolEntry {
            track_id: track_id.into(),
            rating,
            games,
        }
    }

    pub fn as_rating(&self) -> Rating {
        Rating {
            rating: self.rating,
            games: self.games,
        }
    }
}

/// New state of both sides of a decided comparison.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RatingUpdate {
    pub winner: Rating,
    pub loser: Rating,
}

/// Result of replaying a user's comparison log over their vault.
#[derive(Clone, Debug, PartialEq)]
pub struct Replay {
    /// New state of every vault row.
    pub ratings: Vec<PoolEntry>,
    /// Comparisons that were applied, the others involved removed tracks.
    pub replayed: usize,
}

pub enum RecordOutcome {
    Recorded(RatingUpdate),
    /// One of the two tracks isn't in the user's vault, nothing was written.
    MissingTrack(String),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ComparisonEvent {
    pub user_id: usize,
    pub winner_id: String,
    pub loser_id: String,
    pub decided_at: SystemTime,
}

use crate::catalog_store::Track;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Order independent key of a pair of tracks.
pub fn pair_key(a: &str, b: &str) -> String {
    if a <= b {
        format!("{}:{}", a, b)
    } else {
        format!("{}:{}", b, a)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Matchup {
    pub pair_key: String,
    pub track_a: Track,
    pub track_b: Track,
    /// Set when a seed track was requested but couldn't be used.
    pub degraded: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchupRequest {
    #[serde(default)]
    pub seed_track_id: Option<String>,
    #[serde(default)]
    pub exclude_track_ids: Vec<String>,
    #[serde(default)]
    pub exclude_pair_keys: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VoteRequest {
    pub winner_id: String,
    pub loser_id: String,
    #[serde(default)]
    pub seed_id: Option<String>,
    #[serde(default)]
    pub exclude_track_ids: Vec<String>,
    #[serde(default)]
    pub exclude_pair_keys: Vec<String>,
}

impl VoteRequest {
    /// The matchup request for what comes after this vote, the decided pair
    /// is never proposed again right away.
    pub fn next_matchup_request(&self) -> MatchupRequest {
        let mut exclude_pair_keys = self.exclude_pair_keys.clone();
        let decided = pair_key(&self.winner_id, &self.loser_id);
        if !exclude_pair_keys.contains(&decided) {
            exclude_pair_keys.push(decided);
        }
        MatchupRequest {
            seed_track_id: self.seed_id.clone(),
            exclude_track_ids: self.exclude_track_ids.clone(),
            exclude_pair_keys,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VoteResult {
    pub winner_id: String,
    pub loser_id: String,
    pub winner_rating: f64,
    pub loser_rating: f64,
    pub winner_games: u32,
    pub loser_games: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VoteOutcome {
    pub result: VoteResult,
    pub next: Option<Matchup>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RankedTrack {
    pub position: usize,
    #[serde(flatten)]
    pub track: Track,
    pub rating: f64,
    pub games: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddOutcome {
    Added,
    AlreadyInVault,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub winner_id: String,
    pub loser_id: String,
    /// Seconds since epoch.
    pub decided_at: u64,
}

impl HistoryEntry {
    pub fn new(winner_id: String, loser_id: String, decided_at: SystemTime) -> Self {
        let decided_at = decided_at
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        HistoryEntry {
            winner_id,
            loser_id,
            decided_at,
        }
    }
}

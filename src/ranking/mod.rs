mod elo;
mod engine;
mod error;
mod history;
mod models;
mod pool;
mod selector;
mod settings;
mod updater;

pub use elo::{apply_result, expected_score, k_factor};
pub use engine::RankingEngine;
pub use error::RankingError;
pub use history::HistoryWindow;
pub use models::{
    pair_key, AddOutcome, HistoryEntry, Matchup, MatchupRequest, RankedTrack, VoteOutcome,
    VoteRequest, VoteResult,
};
pub use pool::CandidatePoolLoader;
pub use selector::{select_match, Selection};
pub use settings::{EloSettings, RankingSettings};
pub use updater::RatingUpdater;

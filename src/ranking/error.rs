use thiserror::Error;

#[derive(Debug, Error)]
pub enum RankingError {
    #[error("No authenticated user")]
    Unauthorized,

    #[error("Rating update failed, the vote was not recorded: {0}")]
    RatingUpdateFailed(#[source] anyhow::Error),

    #[error("Invalid track id: {0:?}")]
    InvalidTrackId(String),

    #[error("Invalid vote: {0}")]
    InvalidVote(String),

    #[error("Track {0} is not in the vault")]
    TrackNotInPool(String),

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

mod models;
mod schema;
mod sqlite_rating_store;
mod trait_def;

pub use models::{ComparisonEvent, PoolEntry, Rating, RatingUpdate, RecordOutcome, Replay};
pub use schema::RANKING_VERSIONED_SCHEMAS;
pub use sqlite_rating_store::SqliteRatingStore;
pub use trait_def::{ComparisonLog, FullRatingStore, RatingStore};

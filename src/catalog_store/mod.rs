mod models;
mod schema;
mod store;
mod trait_def;

pub use models::{is_valid_track_id, Track, MAX_TRACK_ID_LENGTH};
pub use schema::CATALOG_VERSIONED_SCHEMAS;
pub use store::SqliteCatalogStore;
pub use trait_def::TrackCatalog;

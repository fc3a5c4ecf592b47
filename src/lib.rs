//! Vault Ranker Library
//!
//! This library exposes the internal modules for testing and for the binaries.

pub mod catalog_store;
pub mod config;
pub mod ranking;
pub mod rating_store;
pub mod server;
pub mod sqlite_persistence;
pub mod user;

// Re-export commonly used types for convenience
pub use catalog_store::{SqliteCatalogStore, Track, TrackCatalog};
pub use ranking::{RankingEngine, RankingError, RankingSettings};
pub use rating_store::SqliteRatingStore;
pub use server::{make_app, run_server, RequestsLoggingLevel, ServerConfig};
pub use user::{SqliteUserStore, UserManager, UserStore};

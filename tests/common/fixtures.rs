//! Test fixture creation for the user database and track metadata

use super::constants::*;
use anyhow::Result;
use serde_json::{json, Value};
use std::path::PathBuf;
use tempfile::TempDir;
use vault_ranker::user::{SqliteUserStore, UserManager};

/// Creates a temporary db directory holding a user database with the test
/// users. Returns (temp_dir, user_db_path).
pub fn create_test_db_with_users() -> Result<(TempDir, PathBuf)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("user.db");

    {
        let store = SqliteUserStore::new(&db_path)?;
        let user_manager = UserManager::new(std::sync::Arc::new(store));

        for (handle, password) in [(TEST_USER, TEST_PASS), (OTHER_USER, OTHER_PASS)] {
            let user_id = user_manager.add_user(handle)?;
            user_manager.create_password_credentials(handle, password)?;
            eprintln!("Created test user {} with id {}", handle, user_id);
        }
    }

    Ok((temp_dir, db_path))
}

/// JSON body of the n-th test track, 1-based.
pub fn test_track(n: usize) -> Value {
    json!({
        "id": TRACK_IDS[n - 1],
        "title": TRACK_TITLES[n - 1],
        "artist_name": ARTIST_NAME,
        "album_name": ALBUM_TITLE,
        "cover_url": format!("https://covers.example/{}.jpg", TRACK_IDS[n - 1]),
        "duration_ms": 180_000 + n as u64 * 1000,
    })
}

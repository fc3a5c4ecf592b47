//! Shared constants for end-to-end tests
//!
//! When test data changes (user credentials, track ids, etc.),
//! update only this file.

// ============================================================================
// Test User Credentials
// ============================================================================

/// Regular test user handle
pub const TEST_USER: &str = "testuser";

/// Regular test user password
pub const TEST_PASS: &str = "testpass123";

/// A second user, to check vaults don't leak between users
pub const OTHER_USER: &str = "otheruser";

/// Second user password
pub const OTHER_PASS: &str = "otherpass123";

// ============================================================================
// Test Tracks
// ============================================================================

/// Track ids, `test_track(n)` builds the metadata of `TRACK_IDS[n - 1]`
pub const TRACK_IDS: [&str; 5] = ["track-1", "track-2", "track-3", "track-4", "track-5"];

pub const TRACK_1_ID: &str = "track-1";
pub const TRACK_2_ID: &str = "track-2";
pub const TRACK_3_ID: &str = "track-3";

/// Track titles, same order as TRACK_IDS
pub const TRACK_TITLES: [&str; 5] = [
    "Opening Track",
    "Middle Track",
    "Closing Track",
    "Smooth Jazz",
    "Upbeat Jazz",
];

/// Artist of every test track
pub const ARTIST_NAME: &str = "The Test Band";

/// Album of every test track
pub const ALBUM_TITLE: &str = "First Album";

// ============================================================================
// Ratings
// ============================================================================

pub const INITIAL_RATING: f64 = 1500.0;

// ============================================================================
// Test Timeouts and Configuration
// ============================================================================

/// Maximum time to wait for server to become ready (milliseconds)
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Timeout for individual HTTP requests (seconds)
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Polling interval when waiting for server ready (milliseconds)
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 50;

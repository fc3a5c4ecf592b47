//! HTTP client for end-to-end tests
//!
//! Wraps reqwest and provides one method per vault-ranker endpoint.
//!
//! When API routes or request formats change, update only this file.

use super::constants::*;
use super::fixtures::test_track;
use reqwest::Response;
use serde_json::{json, Value};
use std::time::Duration;

/// HTTP test client with cookie-based session management
pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    /// The base URL of the test server
    pub base_url: String,
}

impl TestClient {
    /// Creates a new unauthenticated client
    ///
    /// Use this for testing authentication flows.
    /// For most tests, use `authenticated()` instead.
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .cookie_store(true) // Automatically handle session cookies
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self { client, base_url }
    }

    /// Creates a client pre-authenticated as the regular test user
    ///
    /// # Panics
    ///
    /// Panics if authentication fails (indicates test infrastructure problem).
    pub async fn authenticated(base_url: String) -> Self {
        Self::authenticated_as(base_url, TEST_USER, TEST_PASS).await
    }

    /// Creates a client pre-authenticated as the given user
    pub async fn authenticated_as(base_url: String, handle: &str, password: &str) -> Self {
        let client = Self::new(base_url);

        let response = client.login(handle, password).await;
        assert_eq!(
            response.status(),
            reqwest::StatusCode::CREATED,
            "Authentication of {} failed: {:?}",
            handle,
            response.text().await
        );

        client
    }

    // ========================================================================
    // Authentication Endpoints
    // ========================================================================

    /// POST /v1/auth/login
    pub async fn login(&self, handle: &str, password: &str) -> Response {
        self.client
            .post(format!("{}/v1/auth/login", self.base_url))
            .json(&json!({
                "user_handle": handle,
                "password": password,
            }))
            .send()
            .await
            .expect("Login request failed")
    }

    /// GET /v1/auth/logout
    pub async fn logout(&self) -> Response {
        self.client
            .get(format!("{}/v1/auth/logout", self.base_url))
            .send()
            .await
            .expect("Logout request failed")
    }

    /// GET /
    pub async fn home(&self) -> Response {
        self.client
            .get(format!("{}/", self.base_url))
            .send()
            .await
            .expect("Home request failed")
    }

    // ========================================================================
    // Vault Endpoints
    // ========================================================================

    /// POST /v1/vault
    pub async fn add_track(&self, track: &Value) -> Response {
        self.client
            .post(format!("{}/v1/vault", self.base_url))
            .json(track)
            .send()
            .await
            .expect("Add track request failed")
    }

    /// POST /v1/vault with the n-th test track, 1-based
    pub async fn add_test_track(&self, n: usize) -> Response {
        self.add_track(&test_track(n)).await
    }

    /// Adds the first `count` test tracks, asserting each one is new
    pub async fn add_test_tracks(&self, count: usize) {
        for n in 1..=count {
            let response = self.add_test_track(n).await;
            assert_eq!(response.status(), reqwest::StatusCode::CREATED);
        }
    }

    /// DELETE /v1/vault/{track_id}
    pub async fn remove_track(&self, track_id: &str) -> Response {
        self.client
            .delete(format!("{}/v1/vault/{}", self.base_url, track_id))
            .send()
            .await
            .expect("Remove track request failed")
    }

    /// GET /v1/vault
    pub async fn rankings(&self) -> Response {
        self.client
            .get(format!("{}/v1/vault", self.base_url))
            .send()
            .await
            .expect("Rankings request failed")
    }

    /// POST /v1/vault/reset
    pub async fn reset(&self) -> Response {
        self.client
            .post(format!("{}/v1/vault/reset", self.base_url))
            .send()
            .await
            .expect("Reset request failed")
    }

    /// POST /v1/vault/recompute
    pub async fn recompute(&self) -> Response {
        self.client
            .post(format!("{}/v1/vault/recompute", self.base_url))
            .send()
            .await
            .expect("Recompute request failed")
    }

    // ========================================================================
    // Ranking Endpoints
    // ========================================================================

    /// POST /v1/ranking/matchup
    pub async fn matchup(&self, request: &Value) -> Response {
        self.client
            .post(format!("{}/v1/ranking/matchup", self.base_url))
            .json(request)
            .send()
            .await
            .expect("Matchup request failed")
    }

    /// POST /v1/ranking/vote with no seed and no exclusions
    pub async fn vote(&self, winner_id: &str, loser_id: &str) -> Response {
        self.vote_with(&json!({
            "winner_id": winner_id,
            "loser_id": loser_id,
        }))
        .await
    }

    /// POST /v1/ranking/vote
    pub async fn vote_with(&self, request: &Value) -> Response {
        self.client
            .post(format!("{}/v1/ranking/vote", self.base_url))
            .json(request)
            .send()
            .await
            .expect("Vote request failed")
    }

    /// GET /v1/ranking/history
    pub async fn history(&self, limit: Option<usize>) -> Response {
        let url = match limit {
            Some(limit) => format!("{}/v1/ranking/history?limit={}", self.base_url, limit),
            None => format!("{}/v1/ranking/history", self.base_url),
        };
        self.client
            .get(url)
            .send()
            .await
            .expect("History request failed")
    }
}
